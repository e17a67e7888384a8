// Copyright 2025-2026 CEMAXECUTER LLC

use thiserror::Error;

/// Fatal startup errors. Every variant ends the process with status 1
/// before the capture loop is entered.
#[derive(Debug, Error)]
pub enum InitError {
    /// Missing or invalid configuration, unreadable config file
    #[error("{0}")]
    Config(String),

    /// A required resource could not be opened
    #[error("{what}: {reason}")]
    ResourceOpen { what: &'static str, reason: String },

    #[error("{0}")]
    Daemonize(String),

    #[error("logging setup failed: {0}")]
    Logging(String),
}

impl InitError {
    pub fn open(what: &'static str, reason: impl Into<String>) -> Self {
        InitError::ResourceOpen {
            what,
            reason: reason.into(),
        }
    }
}
