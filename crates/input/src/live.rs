// Copyright 2025-2026 CEMAXECUTER LLC

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, Host, SampleFormat, SampleRate, StreamConfig, SupportedBufferSize};
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::{FrameSource, ReadOutcome};

pub const SAMPLE_RATE: u32 = 48_000;

/// Requested period size in frames; the device may clamp it
const PERIOD_FRAMES: u32 = 4096;

/// Blocks queued between the audio callback and the reader
const QUEUE_DEPTH: usize = 32;

const READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Shared between the cpal callback thread and the reader
struct CallbackState {
    tx: Sender<Vec<i16>>,
    overrun: Arc<AtomicBool>,
    dropped_blocks: Arc<AtomicU64>,
}

/// Live capture from a cpal input device.
///
/// The audio callback copies each block into a bounded channel; `read`
/// pulls blocks until a full period is assembled. A full channel means the
/// reader fell behind and is reported as an overrun.
pub struct CpalSource {
    spec: String,
    stream: Option<cpal::Stream>,
    rx: Receiver<Vec<i16>>,
    pending: Vec<i16>,
    pending_offset: usize,
    channels: usize,
    frame_len: usize,
    overrun: Arc<AtomicBool>,
    dropped_blocks: Arc<AtomicU64>,
    error: Arc<Mutex<Option<String>>>,
}

/// Split "host:device" when the prefix names an available cpal host.
/// ALSA device names contain colons themselves ("hw:1,0"), so anything
/// else is a device name on the default host.
fn split_host(spec: &str) -> (Option<Host>, &str) {
    if let Some((prefix, rest)) = spec.split_once(':') {
        for id in cpal::available_hosts() {
            if id.name().eq_ignore_ascii_case(prefix) {
                if let Ok(host) = cpal::host_from_id(id) {
                    return (Some(host), rest);
                }
            }
        }
    }
    (None, spec)
}

fn find_device(host: &Host, name: &str) -> Result<Device, String> {
    if name.is_empty() || name == "default" {
        return host
            .default_input_device()
            .ok_or_else(|| "no default input device".to_string());
    }
    let devices = host
        .input_devices()
        .map_err(|e| format!("failed to enumerate input devices: {}", e))?;
    for dev in devices {
        if dev.name().map(|n| n == name).unwrap_or(false) {
            return Ok(dev);
        }
    }
    Err(format!("input device '{}' not found", name))
}

impl CpalSource {
    /// Open and start the device described by `spec` with `channels` channels.
    pub fn open(spec: &str, channels: usize) -> Result<Self, String> {
        let (host, name) = split_host(spec);
        let host = host.unwrap_or_else(cpal::default_host);
        let device = find_device(&host, name)?;
        let dev_name = device.name().unwrap_or_else(|_| name.to_string());

        let wanted = channels as u16;
        let range = device
            .supported_input_configs()
            .map_err(|e| format!("error querying {}: {}", dev_name, e))?
            .find(|c| {
                c.channels() == wanted
                    && c.sample_format() == SampleFormat::I16
                    && c.min_sample_rate().0 <= SAMPLE_RATE
                    && c.max_sample_rate().0 >= SAMPLE_RATE
            })
            .ok_or_else(|| {
                format!(
                    "error setting channels {} on {}: \
                     maybe the sound card is mono-only or stereo-only",
                    channels, dev_name
                )
            })?;

        let (buffer_size, frame_len) = match *range.buffer_size() {
            SupportedBufferSize::Range { min, max } => {
                let period = PERIOD_FRAMES.clamp(min, max);
                (BufferSize::Fixed(period), period as usize)
            }
            SupportedBufferSize::Unknown => (BufferSize::Default, PERIOD_FRAMES as usize),
        };

        let config = StreamConfig {
            channels: wanted,
            sample_rate: SampleRate(SAMPLE_RATE),
            buffer_size,
        };

        let (tx, rx) = bounded::<Vec<i16>>(QUEUE_DEPTH);
        let overrun = Arc::new(AtomicBool::new(false));
        let dropped_blocks = Arc::new(AtomicU64::new(0));
        let error = Arc::new(Mutex::new(None));

        let state = CallbackState {
            tx,
            overrun: overrun.clone(),
            dropped_blocks: dropped_blocks.clone(),
        };
        let err_slot = error.clone();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    match state.tx.try_send(data.to_vec()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            state.overrun.store(true, Ordering::SeqCst);
                            state.dropped_blocks.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(TrySendError::Disconnected(_)) => {}
                    }
                },
                move |err| {
                    if let Ok(mut slot) = err_slot.lock() {
                        slot.get_or_insert_with(|| err.to_string());
                    }
                },
                None,
            )
            .map_err(|e| format!("error opening sound device ({}): {}", spec, e))?;

        stream
            .play()
            .map_err(|e| format!("error starting sound device ({}): {}", spec, e))?;

        log::info!(
            "capturing from {} ({} Hz, {} channel(s), period {} frames)",
            dev_name,
            SAMPLE_RATE,
            channels,
            frame_len
        );

        Ok(Self {
            spec: spec.to_string(),
            stream: Some(stream),
            rx,
            pending: Vec::new(),
            pending_offset: 0,
            channels,
            frame_len,
            overrun,
            dropped_blocks,
            error,
        })
    }

    fn take_error(&self) -> Option<String> {
        self.error.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl FrameSource for CpalSource {
    fn describe(&self) -> String {
        format!("sound device {}", self.spec)
    }

    fn frame_len(&self) -> usize {
        self.frame_len
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn read(&mut self, buf: &mut [i16]) -> ReadOutcome {
        if self.stream.is_none() {
            return ReadOutcome::EndOfStream;
        }
        if let Some(err) = self.take_error() {
            return ReadOutcome::Failed(err);
        }
        if self.overrun.swap(false, Ordering::SeqCst) {
            return ReadOutcome::Overrun;
        }

        let want = (buf.len() / self.channels).min(self.frame_len) * self.channels;
        let mut written = 0;

        while written < want {
            // Drain any pending data from the previous block
            if self.pending_offset < self.pending.len() {
                let start = self.pending_offset;
                let avail = (self.pending.len() - start).min(want - written);
                buf[written..written + avail].copy_from_slice(&self.pending[start..start + avail]);
                written += avail;
                self.pending_offset += avail;
                continue;
            }

            match self.rx.recv_timeout(READ_TIMEOUT) {
                Ok(block) => {
                    self.pending = block;
                    self.pending_offset = 0;
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    return ReadOutcome::Failed("capture stream disconnected".to_string());
                }
            }
        }

        ReadOutcome::Frames(written / self.channels)
    }

    fn rearm(&mut self) -> Result<(), String> {
        // Discard stale blocks so the next read starts at the live edge
        while self.rx.try_recv().is_ok() {}
        self.pending.clear();
        self.pending_offset = 0;
        self.overrun.store(false, Ordering::SeqCst);

        if let Some(ref stream) = self.stream {
            stream
                .pause()
                .map_err(|e| format!("error pausing {}: {}", self.spec, e))?;
            stream
                .play()
                .map_err(|e| format!("error restarting {}: {}", self.spec, e))?;
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            let dropped = self.dropped_blocks.load(Ordering::Relaxed);
            if dropped > 0 {
                log::warn!("{}: {} blocks dropped during capture", self.spec, dropped);
            }
            log::debug!("closed sound device {}", self.spec);
        }
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.close();
    }
}
