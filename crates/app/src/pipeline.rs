use ais_input::recorder::Recorder;
use ais_input::{FrameBuffer, FrameSource, ReadOutcome};

use crate::dispatch::{ChannelDispatcher, Receivers};
use crate::signals::ProcessFlags;
use crate::stats::StatsTimer;

/// Why the capture loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainReason {
    /// The done flag was set (SIGINT/SIGTERM)
    Signal,
    EndOfStream,
    /// Unrecoverable read error; drains like end-of-stream
    ReadError(String),
}

/// Loop counters, logged at debug level on exit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSummary {
    pub reads: u64,
    pub frames: u64,
    pub overruns: u64,
    pub short_reads: u64,
    pub stats_emitted: u64,
    pub reason: DrainReason,
}

/// Everything the loop touches, borrowed from the session that owns it.
pub struct Capture<'a> {
    pub source: &'a mut dyn FrameSource,
    pub buffer: &'a mut FrameBuffer,
    pub recorder: Option<&'a mut Recorder>,
    pub dispatcher: ChannelDispatcher,
    pub receivers: &'a mut Receivers,
}

/// Log one stats line per active receiver.
pub fn log_stats(receivers: &Receivers) {
    for rx in receivers.iter() {
        log::info!("{}: {}", rx.label(), rx.stats());
    }
}

/// Read, record, dispatch and check the stats timer until drained.
///
/// `flags` is polled at the top of every iteration, never inside a read,
/// so shutdown waits for the read and dispatch in flight to complete.
pub fn run_capture(
    cap: Capture<'_>,
    timer: &mut StatsTimer,
    flags: &ProcessFlags,
    clock: &mut dyn FnMut() -> i64,
) -> LoopSummary {
    let Capture {
        source,
        buffer,
        mut recorder,
        dispatcher,
        receivers,
    } = cap;

    let period = buffer.frames();
    let mut summary = LoopSummary {
        reads: 0,
        frames: 0,
        overruns: 0,
        short_reads: 0,
        stats_emitted: 0,
        reason: DrainReason::Signal,
    };

    loop {
        if flags.take_broken_pipe() {
            log::debug!("There is a broken connection");
        }
        if flags.is_done() {
            summary.reason = DrainReason::Signal;
            break;
        }

        let outcome = source.read(buffer.as_mut_slice());
        summary.reads += 1;

        let frames = match outcome {
            ReadOutcome::Frames(0) => continue,
            ReadOutcome::Frames(n) => n,
            ReadOutcome::Overrun => {
                summary.overruns += 1;
                log::error!("overrun occurred on {}", source.describe());
                if let Err(e) = source.rearm() {
                    log::error!("re-arming {} failed: {}", source.describe(), e);
                }
                continue;
            }
            ReadOutcome::EndOfStream => {
                log::info!("end of input reached");
                summary.reason = DrainReason::EndOfStream;
                break;
            }
            ReadOutcome::Failed(e) => {
                log::error!("read from {} failed: {}", source.describe(), e);
                summary.reason = DrainReason::ReadError(e);
                break;
            }
        };

        if frames < period {
            summary.short_reads += 1;
            log::info!("short read, read {} frames", frames);
        }
        summary.frames += frames as u64;

        let samples = buffer.frames_slice(frames);
        if let Some(ref mut rec) = recorder {
            rec.append(samples);
        }
        dispatcher.dispatch(receivers, samples, frames);

        if timer.due(clock()) {
            summary.stats_emitted += 1;
            log_stats(receivers);
        }
    }

    log::debug!(
        "capture loop stopped: {} reads, {} frames, {} overruns, {} short reads",
        summary.reads,
        summary.frames,
        summary.overruns,
        summary.short_reads
    );
    summary
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ChannelLayout;
    use crate::dispatch::tests::{receivers_for, Trace};
    use std::collections::VecDeque;
    use std::sync::atomic::Ordering;

    /// Frame source that replays a script of outcomes. Every `Frames(n)`
    /// fills the first n frames with the read number.
    pub(crate) struct Scripted {
        pub script: VecDeque<ReadOutcome>,
        pub period: usize,
        pub channels: usize,
        pub reads: usize,
        pub rearms: usize,
        pub closes: usize,
    }

    impl Scripted {
        pub(crate) fn new(period: usize, channels: usize, script: Vec<ReadOutcome>) -> Self {
            Self {
                script: script.into(),
                period,
                channels,
                reads: 0,
                rearms: 0,
                closes: 0,
            }
        }
    }

    impl FrameSource for Scripted {
        fn describe(&self) -> String {
            "scripted".to_string()
        }

        fn frame_len(&self) -> usize {
            self.period
        }

        fn channels(&self) -> usize {
            self.channels
        }

        fn read(&mut self, buf: &mut [i16]) -> ReadOutcome {
            self.reads += 1;
            let outcome = self.script.pop_front().unwrap_or(ReadOutcome::EndOfStream);
            if let ReadOutcome::Frames(n) = outcome {
                for s in &mut buf[..n * self.channels] {
                    *s = self.reads as i16;
                }
            }
            outcome
        }

        fn rearm(&mut self) -> Result<(), String> {
            self.rearms += 1;
            Ok(())
        }

        fn close(&mut self) {
            self.closes += 1;
        }
    }

    struct Rig {
        source: Scripted,
        buffer: FrameBuffer,
        receivers: Receivers,
        layout: ChannelLayout,
        trace: Trace,
    }

    impl Rig {
        fn new(layout: ChannelLayout, period: usize, script: Vec<ReadOutcome>) -> Self {
            let trace = Trace::default();
            let source = Scripted::new(period, layout.channels(), script);
            let buffer = FrameBuffer::for_source(&source).unwrap();
            Self {
                receivers: receivers_for(layout, &trace),
                source,
                buffer,
                layout,
                trace,
            }
        }

        fn run(&mut self, timer: &mut StatsTimer, flags: &ProcessFlags) -> LoopSummary {
            let mut t: i64 = 0;
            let mut clock = || {
                t += 1;
                t
            };
            self.run_with_clock(timer, flags, &mut clock)
        }

        fn run_with_clock(
            &mut self,
            timer: &mut StatsTimer,
            flags: &ProcessFlags,
            clock: &mut dyn FnMut() -> i64,
        ) -> LoopSummary {
            let cap = Capture {
                source: &mut self.source,
                buffer: &mut self.buffer,
                recorder: None,
                dispatcher: ChannelDispatcher::new(self.layout),
                receivers: &mut self.receivers,
            };
            run_capture(cap, timer, flags, clock)
        }

        fn labels(&self) -> Vec<char> {
            self.trace.borrow().iter().map(|(l, _)| *l).collect()
        }
    }

    fn no_stats() -> StatsTimer {
        StatsTimer::new(0, 0)
    }

    #[test]
    fn test_end_of_stream_drains() {
        let mut rig = Rig::new(
            ChannelLayout::Mono,
            4,
            vec![ReadOutcome::Frames(4), ReadOutcome::Frames(4)],
        );
        let flags = ProcessFlags::new();
        let summary = rig.run(&mut no_stats(), &flags);
        assert_eq!(summary.reason, DrainReason::EndOfStream);
        assert_eq!(summary.frames, 8);
        assert_eq!(rig.labels(), vec!['A', 'A']);
        assert!(!flags.is_done());
    }

    #[test]
    fn test_broken_pipe_does_not_stop_loop() {
        let script = vec![ReadOutcome::Frames(4), ReadOutcome::Frames(4)];
        let mut clean = Rig::new(ChannelLayout::Mono, 4, script.clone());
        let expected = clean.run(&mut no_stats(), &ProcessFlags::new());

        let mut rig = Rig::new(ChannelLayout::Mono, 4, script);
        let flags = ProcessFlags::new();
        flags.broken_pipe.store(true, Ordering::SeqCst);
        let summary = rig.run(&mut no_stats(), &flags);

        assert_eq!(summary, expected);
        assert_eq!(summary.reason, DrainReason::EndOfStream);
        assert_eq!(rig.labels(), vec!['A', 'A']);
        // Observed and cleared, never turned into a stop
        assert!(!flags.broken_pipe.load(Ordering::SeqCst));
        assert!(!flags.is_done());
    }

    #[test]
    fn test_done_flag_stops_before_reading() {
        let mut rig = Rig::new(ChannelLayout::Mono, 4, vec![ReadOutcome::Frames(4)]);
        let flags = ProcessFlags::new();
        flags.request_stop();
        let summary = rig.run(&mut no_stats(), &flags);
        assert_eq!(summary.reason, DrainReason::Signal);
        assert_eq!(rig.source.reads, 0);
        assert!(rig.labels().is_empty());
    }

    #[test]
    fn test_overrun_rearms_and_continues() {
        let mut rig = Rig::new(
            ChannelLayout::Mono,
            4,
            vec![
                ReadOutcome::Frames(4),
                ReadOutcome::Overrun,
                ReadOutcome::Frames(4),
            ],
        );
        let flags = ProcessFlags::new();
        let summary = rig.run(&mut no_stats(), &flags);
        assert_eq!(rig.source.rearms, 1);
        assert_eq!(summary.overruns, 1);
        assert_eq!(summary.reason, DrainReason::EndOfStream);
        // The overrun iteration dispatched nothing
        assert_eq!(rig.labels(), vec!['A', 'A']);
        assert!(!flags.done.load(Ordering::SeqCst));
    }

    #[test]
    fn test_read_error_drains() {
        let mut rig = Rig::new(
            ChannelLayout::Mono,
            4,
            vec![
                ReadOutcome::Failed("device unplugged".to_string()),
                ReadOutcome::Frames(4),
            ],
        );
        let summary = rig.run(&mut no_stats(), &ProcessFlags::new());
        assert_eq!(
            summary.reason,
            DrainReason::ReadError("device unplugged".to_string())
        );
        assert!(rig.labels().is_empty());
    }

    #[test]
    fn test_zero_frames_not_dispatched() {
        let mut rig = Rig::new(
            ChannelLayout::Mono,
            4,
            vec![ReadOutcome::Frames(0), ReadOutcome::Frames(4)],
        );
        let summary = rig.run(&mut no_stats(), &ProcessFlags::new());
        assert_eq!(summary.reads, 3);
        assert_eq!(rig.labels(), vec!['A']);
    }

    #[test]
    fn test_short_read_dispatched_alone() {
        let mut rig = Rig::new(
            ChannelLayout::Both,
            4,
            vec![ReadOutcome::Frames(1), ReadOutcome::Frames(4)],
        );
        let summary = rig.run(&mut no_stats(), &ProcessFlags::new());
        assert_eq!(summary.short_reads, 1);
        let trace = rig.trace.borrow();
        assert_eq!(trace.len(), 4);
        // Short read is not padded or merged with the next one
        assert_eq!(trace[0], ('A', vec![1]));
        assert_eq!(trace[1], ('B', vec![1]));
        assert_eq!(trace[2], ('A', vec![2, 2, 2, 2]));
        assert_eq!(trace[3], ('B', vec![2, 2, 2, 2]));
    }

    #[test]
    fn test_each_layout_dispatches_once_per_read() {
        for layout in [
            ChannelLayout::Mono,
            ChannelLayout::Left,
            ChannelLayout::Right,
            ChannelLayout::Both,
        ] {
            let mut rig = Rig::new(layout, 8, vec![ReadOutcome::Frames(8); 3]);
            rig.run(&mut no_stats(), &ProcessFlags::new());
            let per_read: Vec<char> = layout.receivers().iter().map(|r| r.0).collect();
            assert_eq!(rig.labels(), per_read.repeat(3), "{:?}", layout);
        }
    }

    #[test]
    fn test_stats_emitted_on_interval() {
        let mut rig = Rig::new(ChannelLayout::Mono, 4, vec![ReadOutcome::Frames(4); 10]);
        let mut timer = StatsTimer::new(3, 0);
        // One second per read
        let summary = rig.run(&mut timer, &ProcessFlags::new());
        assert_eq!(summary.stats_emitted, 3);
    }

    #[test]
    fn test_stats_survive_clock_jump() {
        let mut rig = Rig::new(ChannelLayout::Mono, 4, vec![ReadOutcome::Frames(4); 8]);
        let mut timer = StatsTimer::new(10, 1000);
        let mut times = vec![1005, 1010, 400, 401, 402, 409, 410, 411].into_iter();
        let mut clock = move || times.next().unwrap_or(411);
        let summary = rig.run_with_clock(&mut timer, &ProcessFlags::new(), &mut clock);
        // 1010 fires; 400 resets the baseline; 410 fires again
        assert_eq!(summary.stats_emitted, 2);
    }

    #[test]
    fn test_recording_sees_every_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.raw");
        let mut rec = Recorder::create(&path, 1).unwrap();
        let mut source = Scripted::new(
            4,
            1,
            vec![
                ReadOutcome::Frames(4),
                ReadOutcome::Overrun,
                ReadOutcome::Frames(2),
            ],
        );
        let mut buffer = FrameBuffer::for_source(&source).unwrap();
        let trace = Trace::default();
        let mut receivers = receivers_for(ChannelLayout::Mono, &trace);
        let cap = Capture {
            source: &mut source,
            buffer: &mut buffer,
            recorder: Some(&mut rec),
            dispatcher: ChannelDispatcher::new(ChannelLayout::Mono),
            receivers: &mut receivers,
        };
        run_capture(cap, &mut no_stats(), &ProcessFlags::new(), &mut || 0);
        assert_eq!(rec.frames_written(), 6);
        rec.close();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes, vec![1, 0, 1, 0, 1, 0, 1, 0, 3, 0, 3, 0]);
    }
}
