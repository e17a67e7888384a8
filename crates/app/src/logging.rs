// Copyright 2025-2026 CEMAXECUTER LLC

use std::fs::OpenOptions;
use std::path::Path;

use env_logger::{Builder, Target};
use log::LevelFilter;

use crate::error::InitError;

/// Set up the global logger. `RUST_LOG` overrides the default level.
pub fn init(log_file: Option<&Path>, verbose: bool) -> Result<(), InitError> {
    let mut builder = Builder::new();
    builder.filter_level(if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
    builder.parse_default_env();
    builder.format_timestamp_secs();

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| InitError::Logging(format!("{}: {}", path.display(), e)))?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder
        .try_init()
        .map_err(|e| InitError::Logging(e.to_string()))
}

pub fn close() {
    log::logger().flush();
}
