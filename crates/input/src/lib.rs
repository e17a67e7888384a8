pub mod file;
pub mod recorder;

#[cfg(feature = "live")]
pub mod live;

/// Result of a single blocking read from a frame source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` frames were written to the front of the buffer (may be short, or 0)
    Frames(usize),
    /// The backend dropped samples; call `rearm()` and keep reading
    Overrun,
    /// The stream has no more data
    EndOfStream,
    /// Unrecoverable read error
    Failed(String),
}

/// Common trait for all audio capture backends.
///
/// A source is opened by its constructor; the period length and channel
/// count are fixed from that point on.
pub trait FrameSource {
    /// Human readable description for log lines
    fn describe(&self) -> String;

    /// Frames per read (the backend's natural period size, always > 0)
    fn frame_len(&self) -> usize;

    /// Interleaved channels per frame
    fn channels(&self) -> usize;

    /// Block until up to `buf.len() / channels()` frames are available.
    fn read(&mut self, buf: &mut [i16]) -> ReadOutcome;

    /// Re-arm the backend after an overrun.
    fn rearm(&mut self) -> Result<(), String>;

    /// Release the underlying device or file. Calling twice is a no-op.
    fn close(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn frame_len(&self) -> usize {
        (**self).frame_len()
    }

    fn channels(&self) -> usize {
        (**self).channels()
    }

    fn read(&mut self, buf: &mut [i16]) -> ReadOutcome {
        (**self).read(buf)
    }

    fn rearm(&mut self) -> Result<(), String> {
        (**self).rearm()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Frame buffer: one allocation of interleaved int16 samples, sized once
/// from the opened source and reused for every read.
pub struct FrameBuffer {
    data: Vec<i16>,
    frames: usize,
    channels: usize,
}

impl FrameBuffer {
    pub fn new(frames: usize, channels: usize) -> Result<Self, String> {
        if frames == 0 || channels == 0 {
            return Err(format!(
                "invalid frame buffer geometry: {} frames of {} channels",
                frames, channels
            ));
        }
        log::debug!(
            "using sound buffer size: {} frames of {} channels: {} bytes",
            frames,
            channels,
            frames * channels * std::mem::size_of::<i16>()
        );
        Ok(Self {
            data: vec![0i16; frames * channels],
            frames,
            channels,
        })
    }

    /// Allocate a buffer matching the source's period and channel count.
    pub fn for_source(source: &dyn FrameSource) -> Result<Self, String> {
        Self::new(source.frame_len(), source.channels())
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Whole buffer, for handing to `FrameSource::read`
    pub fn as_mut_slice(&mut self) -> &mut [i16] {
        &mut self.data
    }

    /// The first `frames` frames of interleaved samples
    pub fn frames_slice(&self, frames: usize) -> &[i16] {
        &self.data[..frames.min(self.frames) * self.channels]
    }
}
