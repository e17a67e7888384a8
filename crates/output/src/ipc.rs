// Copyright 2025-2026 CEMAXECUTER LLC

use std::io::{self, Write};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

struct Listener {
    listener: UnixListener,
    clients: Vec<UnixStream>,
}

/// Unix domain socket for GUI clients. Every sentence is written as one
/// line to each connected client; clients that fail a write are dropped.
pub struct IpcSink {
    path: PathBuf,
    /// (dev, ino) of the socket file we created
    identity: (u64, u64),
    inner: Mutex<Option<Listener>>,
}

fn file_identity(path: &Path) -> io::Result<(u64, u64)> {
    std::fs::symlink_metadata(path).map(|m| (m.dev(), m.ino()))
}

/// Remove `path` only if it is a socket nobody is listening on.
fn clear_stale_socket(path: &Path) -> Result<(), String> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(format!("failed to stat {}: {}", path.display(), e)),
    };
    if !meta.file_type().is_socket() {
        return Err(format!("{} exists and is not a socket", path.display()));
    }
    match UnixStream::connect(path) {
        Ok(_) => Err(format!("{} is in use by another process", path.display())),
        Err(ref e) if e.kind() == io::ErrorKind::ConnectionRefused => {
            std::fs::remove_file(path)
                .map_err(|e| format!("failed to remove {}: {}", path.display(), e))?;
            log::debug!("removed stale socket {}", path.display());
            Ok(())
        }
        Err(e) => Err(format!("probing {}: {}", path.display(), e)),
    }
}

impl IpcSink {
    /// Listen on `path`. A leftover socket from an earlier run is replaced;
    /// anything else at the path (a live socket, a regular file) is an error.
    pub fn bind(path: &Path) -> Result<Arc<Self>, String> {
        clear_stale_socket(path)?;

        let listener = UnixListener::bind(path)
            .map_err(|e| format!("failed to bind {}: {}", path.display(), e))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| format!("set_nonblocking on {}: {}", path.display(), e))?;
        let identity = file_identity(path)
            .map_err(|e| format!("failed to stat {}: {}", path.display(), e))?;

        log::debug!("IPC socket listening on {}", path.display());
        Ok(Arc::new(Self {
            path: path.to_path_buf(),
            identity,
            inner: Mutex::new(Some(Listener {
                listener,
                clients: Vec::new(),
            })),
        }))
    }

    fn accept_pending(l: &mut Listener) {
        loop {
            match l.listener.accept() {
                Ok((stream, _)) => {
                    if stream.set_nonblocking(true).is_ok() {
                        log::debug!("IPC client connected");
                        l.clients.push(stream);
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::warn!("IPC accept failed: {}", e);
                    break;
                }
            }
        }
    }

    /// Send one line to every connected client.
    pub fn send(&self, line: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let l = match inner.as_mut() {
            Some(l) => l,
            None => return,
        };
        Self::accept_pending(l);

        let msg = format!("{}\n", line);
        l.clients.retain_mut(|c| match c.write_all(msg.as_bytes()) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("dropping IPC client: {}", e);
                false
            }
        });
    }

    /// Connected clients, after accepting any pending connections
    pub fn client_count(&self) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match inner.as_mut() {
            Some(l) => {
                Self::accept_pending(l);
                l.clients.len()
            }
            None => 0,
        }
    }

    /// Close the listener and all clients, and remove the socket file.
    /// Returns false if already deinitialized.
    pub fn deinit(&self) -> bool {
        let taken = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match taken {
            Some(l) => {
                drop(l);
                // Only unlink the file we created; it may have been replaced
                if file_identity(&self.path).ok() == Some(self.identity) {
                    let _ = std::fs::remove_file(&self.path);
                }
                log::debug!("IPC socket {} closed", self.path.display());
                true
            }
            None => false,
        }
    }
}
