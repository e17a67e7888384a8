// Copyright 2025-2026 CEMAXECUTER LLC

use std::path::Path;

use nix::unistd::{fork, getpid, setsid, ForkResult};

use crate::error::InitError;

/// Which side of the fork we are on
#[derive(Debug, PartialEq, Eq)]
pub enum Role {
    Parent(i32),
    Child,
}

/// Fork once. Must be called before any thread is spawned.
pub fn fork_to_background() -> Result<Role, InitError> {
    // Safety: single-threaded at this point; the child only continues
    // normal startup.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => Ok(Role::Parent(child.as_raw())),
        Ok(ForkResult::Child) => {
            // Detach from the controlling terminal; failure is harmless
            if let Err(e) = setsid() {
                log::debug!("setsid failed: {}", e);
            }
            Ok(Role::Child)
        }
        Err(e) => Err(InitError::Daemonize(format!(
            "fork to background failed: {}",
            e
        ))),
    }
}

/// Write our pid. An unmanageable background process must not keep
/// running, so failure here is fatal for the child.
pub fn write_pidfile(path: &Path) -> Result<(), InitError> {
    std::fs::write(path, format!("{}\n", getpid()))
        .map_err(|e| InitError::open("pidfile", format!("{}: {}", path.display(), e)))
}
