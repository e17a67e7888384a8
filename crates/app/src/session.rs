// Copyright 2025-2026 CEMAXECUTER LLC

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use ais_input::file::FileSource;
use ais_input::recorder::Recorder;
use ais_input::{FrameBuffer, FrameSource};
use ais_output::cache::{PositionCache, SharedCache};
use ais_output::ipc::IpcSink;
use ais_output::serial::SerialSink;
use ais_output::uplink::JsonUplink;
use ais_receiver::{Decoder, Receiver, Sinks};

use crate::config::RuntimeConfig;
use crate::dispatch::{ChannelDispatcher, Receivers};
use crate::error::InitError;
use crate::pipeline::{self, Capture, LoopSummary};
use crate::signals::ProcessFlags;
use crate::stats::StatsTimer;

/// Builds the decoder for a receiver label
pub type DecoderFactory<'a> = dyn FnMut(char) -> Box<dyn Decoder> + 'a;

/// One teardown action, reported so callers can see what was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CloseSource,
    CloseRecording,
    ReleaseBuffer,
    DeinitIpc,
    CloseSerial,
    DeinitUplink,
    DeinitCache,
    FinalStats,
    DestroyReceivers,
}

/// Every resource acquired during startup. Each slot is `None` until
/// acquired and again after it is released, so teardown is safe on any
/// partially initialized session and runs each step at most once.
#[derive(Default)]
pub struct Session {
    source: Option<Box<dyn FrameSource>>,
    recorder: Option<Recorder>,
    buffer: Option<FrameBuffer>,
    ipc: Option<Arc<IpcSink>>,
    serial: Option<Arc<SerialSink>>,
    uplink: Option<JsonUplink>,
    cache: Option<SharedCache>,
    receivers: Receivers,
}

/// Pick and open the frame source: a configured device first, then a file.
/// No fallback if the chosen one fails.
fn open_source(config: &RuntimeConfig) -> Result<Box<dyn FrameSource>, InitError> {
    let channels = config.channels.channels();

    if let Some(ref device) = config.sound_device {
        return open_device(device, channels);
    }
    match config.sound_in_file {
        Some(ref path) => {
            let source = FileSource::open(path, config.sound_format, channels)
                .map_err(|e| InitError::open("frame source", e))?;
            Ok(Box::new(source))
        }
        None => Err(InitError::Config(
            "neither sound device or sound file configured".to_string(),
        )),
    }
}

#[cfg(feature = "live")]
fn open_device(spec: &str, channels: usize) -> Result<Box<dyn FrameSource>, InitError> {
    let source = ais_input::live::CpalSource::open(spec, channels)
        .map_err(|e| InitError::open("frame source", e))?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "live"))]
fn open_device(spec: &str, _channels: usize) -> Result<Box<dyn FrameSource>, InitError> {
    Err(InitError::Config(format!(
        "sound device {} requested but live capture is not compiled in \
         (enable the \"live\" feature)",
        spec
    )))
}

impl Session {
    /// Acquire everything the capture loop needs, in startup order.
    ///
    /// On error the partially built session is dropped, which releases
    /// whatever had been acquired.
    pub fn start(
        config: &RuntimeConfig,
        make_decoder: &mut DecoderFactory<'_>,
    ) -> Result<Session, InitError> {
        let mut session = Session::default();

        if let Some(ref up) = config.uplink {
            let cache = PositionCache::init(up.cache_entries, up.cache_max_age)
                .map_err(|e| InitError::open("position cache", e))?;
            session.cache = Some(cache.clone());
            let uplink = JsonUplink::init(
                &up.url,
                &up.station,
                Duration::from_secs(up.interval),
                cache,
            )
            .map_err(|e| InitError::open("JSON uplink", e))?;
            session.uplink = Some(uplink);
        }

        if let Some(ref path) = config.serial_port {
            match SerialSink::open(path) {
                Ok(port) => session.serial = Some(port),
                Err(e) => log::warn!("{}; serial output disabled", e),
            }
        }

        if let Some(ref path) = config.ipc_socket {
            match IpcSink::bind(path) {
                Ok(sock) => session.ipc = Some(sock),
                Err(e) => log::error!("Could not open IPC socket: {}", e),
            }
        }

        let source = open_source(config)?;
        let want = config.channels.channels();
        if source.channels() != want {
            return Err(InitError::Config(format!(
                "{} delivers {} channel(s), layout {:?} needs {}",
                source.describe(),
                source.channels(),
                config.channels,
                want
            )));
        }
        let buffer = FrameBuffer::new(source.frame_len(), source.channels())
            .map_err(|e| InitError::open("frame buffer", e))?;
        session.source = Some(source);
        session.buffer = Some(buffer);

        if let Some(ref path) = config.sound_out_file {
            let rec = Recorder::create(path, want)
                .map_err(|e| InitError::open("recording", e))?;
            session.recorder = Some(rec);
        }

        let sinks = Sinks {
            serial: session.serial.clone(),
            ipc: session.ipc.clone(),
            cache: session.cache.clone(),
        };
        for &(label, offset) in config.channels.receivers() {
            let rx = Receiver::new(label, want, offset, make_decoder(label), sinks.clone())
                .map_err(InitError::Config)?;
            match label {
                'A' => session.receivers.a = Some(rx),
                _ => session.receivers.b = Some(rx),
            }
        }

        Ok(session)
    }

    /// Run the capture loop until drained. A session that has already been
    /// torn down drains immediately.
    pub fn run(
        &mut self,
        config: &RuntimeConfig,
        flags: &ProcessFlags,
        clock: &mut dyn FnMut() -> i64,
    ) -> LoopSummary {
        let (source, buffer) = match (self.source.as_mut(), self.buffer.as_mut()) {
            (Some(s), Some(b)) => (s, b),
            _ => {
                return LoopSummary {
                    reads: 0,
                    frames: 0,
                    overruns: 0,
                    short_reads: 0,
                    stats_emitted: 0,
                    reason: pipeline::DrainReason::EndOfStream,
                }
            }
        };
        let mut timer = StatsTimer::new(config.stats_interval, clock());
        let cap = Capture {
            source: &mut **source,
            buffer,
            recorder: self.recorder.as_mut(),
            dispatcher: ChannelDispatcher::new(config.channels),
            receivers: &mut self.receivers,
        };
        pipeline::run_capture(cap, &mut timer, flags, clock)
    }

    /// Release everything in shutdown order. Steps whose resource was never
    /// acquired (or already released) are skipped; returns the steps taken.
    pub fn teardown(&mut self) -> Vec<Step> {
        let mut steps = Vec::new();

        if let Some(mut source) = self.source.take() {
            source.close();
            steps.push(Step::CloseSource);
        }
        if let Some(mut rec) = self.recorder.take() {
            rec.close();
            steps.push(Step::CloseRecording);
        }
        if self.buffer.take().is_some() {
            steps.push(Step::ReleaseBuffer);
        }
        if let Some(ipc) = self.ipc.take() {
            ipc.deinit();
            steps.push(Step::DeinitIpc);
        }
        if let Some(serial) = self.serial.take() {
            serial.close();
            steps.push(Step::CloseSerial);
        }
        if let Some(mut uplink) = self.uplink.take() {
            uplink.deinit();
            steps.push(Step::DeinitUplink);
        }
        if let Some(cache) = self.cache.take() {
            cache.lock().unwrap_or_else(PoisonError::into_inner).deinit();
            steps.push(Step::DeinitCache);
        }
        if !self.receivers.is_empty() {
            pipeline::log_stats(&self.receivers);
            steps.push(Step::FinalStats);
        }
        if self.receivers.clear() {
            steps.push(Step::DestroyReceivers);
        }

        steps
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}
