// Copyright 2025-2026 CEMAXECUTER LLC

use std::os::raw::c_int;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::error::InitError;

/// Process-wide cooperative flags. Written by signal handlers, polled by
/// the capture loop once per iteration.
pub struct ProcessFlags {
    pub done: AtomicBool,
    pub broken_pipe: AtomicBool,
}

impl ProcessFlags {
    pub const fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            broken_pipe: AtomicBool::new(false),
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    pub fn request_stop(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    /// True once per delivered SIGPIPE
    pub fn take_broken_pipe(&self) -> bool {
        self.broken_pipe.swap(false, Ordering::SeqCst)
    }
}

impl Default for ProcessFlags {
    fn default() -> Self {
        Self::new()
    }
}

static PROCESS: ProcessFlags = ProcessFlags::new();

/// The flags the installed handlers write to
pub fn process_flags() -> &'static ProcessFlags {
    &PROCESS
}

// Handlers only store to an atomic; nothing else is async-signal-safe here.
extern "C" fn on_interrupt(_: c_int) {
    PROCESS.done.store(true, Ordering::SeqCst);
}

extern "C" fn on_broken_pipe(_: c_int) {
    PROCESS.broken_pipe.store(true, Ordering::SeqCst);
}

fn install(signal: Signal, handler: extern "C" fn(c_int)) -> Result<(), InitError> {
    // SA_RESTART: a read in flight is resumed, shutdown waits for the
    // current iteration to finish
    let action = SigAction::new(
        SigHandler::Handler(handler),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    unsafe { sigaction(signal, &action) }
        .map(|_| ())
        .map_err(|e| InitError::Config(format!("installing {:?} handler: {}", signal, e)))
}

/// Install SIGINT/SIGTERM (stop) and SIGPIPE (note and carry on) handlers.
pub fn install_handlers() -> Result<(), InitError> {
    install(Signal::SIGINT, on_interrupt)?;
    install(Signal::SIGTERM, on_interrupt)?;
    install(Signal::SIGPIPE, on_broken_pipe)?;
    Ok(())
}
