// Copyright 2025-2026 CEMAXECUTER LLC

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// NMEA output to a serial port (or any writable character device).
/// Line settings are left to the system (stty / udev rules).
pub struct SerialSink {
    path: PathBuf,
    port: Mutex<Option<File>>,
    sent: AtomicU64,
}

impl SerialSink {
    pub fn open(path: &Path) -> Result<Arc<Self>, String> {
        let port = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| format!("failed to open serial port {}: {}", path.display(), e))?;
        log::info!("NMEA output to serial port {}", path.display());
        Ok(Arc::new(Self {
            path: path.to_path_buf(),
            port: Mutex::new(Some(port)),
            sent: AtomicU64::new(0),
        }))
    }

    /// Write one sentence terminated with CRLF. Errors are logged and dropped.
    pub fn send(&self, sentence: &str) {
        let mut port = self.port.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ref mut p) = *port {
            let line = format!("{}\r\n", sentence);
            match p.write_all(line.as_bytes()) {
                Ok(()) => {
                    self.sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => log::warn!("serial write to {} failed: {}", self.path.display(), e),
            }
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn is_open(&self) -> bool {
        self.port
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Close the port. Returns false if it was already closed.
    pub fn close(&self) -> bool {
        let port = self
            .port
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if port.is_some() {
            log::debug!("closed serial port {}", self.path.display());
        }
        port.is_some()
    }
}
