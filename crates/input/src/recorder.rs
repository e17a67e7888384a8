use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};

/// Passthrough recording of every frame read, as interleaved S16LE.
pub struct Recorder {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    scratch: Vec<u8>,
    frames_written: u64,
    channels: usize,
}

impl Recorder {
    pub fn create(path: &Path, channels: usize) -> Result<Self, String> {
        let file = File::create(path)
            .map_err(|e| format!("could not open sound output file {}: {}", path.display(), e))?;
        log::info!("recording audio to file: {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
            scratch: Vec::new(),
            frames_written: 0,
            channels: channels.max(1),
        })
    }

    /// Append interleaved samples verbatim. Write errors are logged, not fatal.
    pub fn append(&mut self, samples: &[i16]) {
        let writer = match self.writer.as_mut() {
            Some(w) => w,
            None => return,
        };
        self.scratch.resize(samples.len() * 2, 0);
        LittleEndian::write_i16_into(samples, &mut self.scratch);
        match writer.write_all(&self.scratch) {
            Ok(()) => self.frames_written += (samples.len() / self.channels) as u64,
            Err(e) => log::error!("write to {} failed: {}", self.path.display(), e),
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Flush and close. Returns false if the recording was already closed.
    pub fn close(&mut self) -> bool {
        match self.writer.take() {
            Some(mut w) => {
                if let Err(e) = w.flush() {
                    log::error!("flush of {} failed: {}", self.path.display(), e);
                }
                log::debug!(
                    "closed recording {} ({} frames)",
                    self.path.display(),
                    self.frames_written
                );
                true
            }
            None => false,
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.close();
    }
}
