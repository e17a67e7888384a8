// Copyright 2025-2026 CEMAXECUTER LLC

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};

use crate::{FrameSource, ReadOutcome};

/// Frames per read for file replay: 1024 rounded down to a whole number of
/// 5-sample symbols (9600 baud at 48 kHz).
pub const FILE_PERIOD_FRAMES: usize = 1024 - 1024 % 5;

/// PCM sample format for file input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// Signed 8-bit
    S8,
    /// Signed 16-bit, little-endian
    #[default]
    S16Le,
    /// 32-bit float in [-1, 1], little-endian
    F32Le,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S8 => 1,
            SampleFormat::S16Le => 2,
            SampleFormat::F32Le => 4,
        }
    }

    /// Parse the names used on the command line and in config files.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "s8" => Some(SampleFormat::S8),
            "s16le" | "s16" => Some(SampleFormat::S16Le),
            "f32le" | "f32" => Some(SampleFormat::F32Le),
            _ => None,
        }
    }
}

/// Headerless interleaved PCM file replayed as a stream.
pub struct FileSource {
    path: PathBuf,
    format: SampleFormat,
    channels: usize,
    frame_len: usize,
    reader: Option<BufReader<File>>,
    scratch: Vec<u8>,
    eof: bool,
}

impl FileSource {
    pub fn open(path: &Path, format: SampleFormat, channels: usize) -> Result<Self, String> {
        if channels == 0 {
            return Err("file source needs at least one channel".to_string());
        }
        let file = File::open(path)
            .map_err(|e| format!("could not open sound file {}: {}", path.display(), e))?;

        log::info!(
            "reading audio from file: {} ({:?}, {} channel(s))",
            path.display(),
            format,
            channels
        );

        let frame_len = FILE_PERIOD_FRAMES;
        Ok(Self {
            path: path.to_path_buf(),
            format,
            channels,
            frame_len,
            reader: Some(BufReader::with_capacity(256 * 1024, file)),
            scratch: vec![0u8; frame_len * channels * format.bytes_per_sample()],
            eof: false,
        })
    }

    /// Fill `buf` from the reader until it is full or the file ends.
    fn read_full(reader: &mut BufReader<File>, buf: &mut [u8]) -> io::Result<(usize, bool)> {
        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => return Ok((filled, true)),
                Ok(n) => filled += n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok((filled, false))
    }

    fn convert(format: SampleFormat, src: &[u8], dst: &mut [i16]) {
        match format {
            SampleFormat::S8 => {
                for (d, &s) in dst.iter_mut().zip(src) {
                    // Scale i8 [-128, 127] to i16 range by shifting left 8
                    *d = (s as i8 as i16) << 8;
                }
            }
            SampleFormat::S16Le => LittleEndian::read_i16_into(src, dst),
            SampleFormat::F32Le => {
                for (d, chunk) in dst.iter_mut().zip(src.chunks_exact(4)) {
                    let f = LittleEndian::read_f32(chunk);
                    *d = (f * 32767.0).clamp(-32768.0, 32767.0) as i16;
                }
            }
        }
    }
}

impl FrameSource for FileSource {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn frame_len(&self) -> usize {
        self.frame_len
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn read(&mut self, buf: &mut [i16]) -> ReadOutcome {
        if self.eof {
            return ReadOutcome::EndOfStream;
        }
        let reader = match self.reader.as_mut() {
            Some(r) => r,
            None => return ReadOutcome::EndOfStream,
        };

        let bytes_per_frame = self.channels * self.format.bytes_per_sample();
        let max_frames = (buf.len() / self.channels).min(self.frame_len);
        let want = max_frames * bytes_per_frame;

        let (got, eof) = match Self::read_full(reader, &mut self.scratch[..want]) {
            Ok(r) => r,
            Err(e) => return ReadOutcome::Failed(format!("read error: {}", e)),
        };
        self.eof = eof;

        // A trailing partial frame at EOF is dropped
        let frames = got / bytes_per_frame;
        if frames == 0 {
            log::info!("end of file: {}", self.path.display());
            self.eof = true;
            return ReadOutcome::EndOfStream;
        }

        let samples = frames * self.channels;
        Self::convert(
            self.format,
            &self.scratch[..samples * self.format.bytes_per_sample()],
            &mut buf[..samples],
        );
        ReadOutcome::Frames(frames)
    }

    fn rearm(&mut self) -> Result<(), String> {
        // Files cannot overrun
        Ok(())
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            log::debug!("closed sound file {}", self.path.display());
        }
    }
}
