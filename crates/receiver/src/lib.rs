pub mod agc;
pub mod burst;

use std::fmt;
use std::sync::{Arc, PoisonError};

use ais_output::cache::{Position, SharedCache};
use ais_output::ipc::IpcSink;
use ais_output::serial::SerialSink;

/// Decoder counters. Mutated only by the decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames that passed every check
    pub received_frames: u64,
    /// Frames that failed the integrity (CRC) check
    pub lost_frames: u64,
    /// Frames that failed the size check
    pub lost_frames2: u64,
}

impl fmt::Display for DecoderStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Received correctly: {} packets, wrong CRC: {} packets, wrong size: {} packets",
            self.received_frames, self.lost_frames, self.lost_frames2
        )
    }
}

/// One decoded message
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// NMEA sentence for serial and IPC output
    pub sentence: String,
    /// Position for the uplink cache, if the message carried one
    pub position: Option<Position>,
}

/// Protocol decoder bound to one channel of samples.
pub trait Decoder {
    /// Consume mono samples; push any decoded messages to `out`.
    fn process(&mut self, samples: &[i16], out: &mut Vec<Report>);

    fn stats(&self) -> DecoderStats;
}

/// Output sinks a receiver forwards its reports to. All optional.
#[derive(Clone, Default)]
pub struct Sinks {
    pub serial: Option<Arc<SerialSink>>,
    pub ipc: Option<Arc<IpcSink>>,
    pub cache: Option<SharedCache>,
}

impl Sinks {
    fn publish(&self, report: Report) {
        if let Some(ref serial) = self.serial {
            serial.send(&report.sentence);
        }
        if let Some(ref ipc) = self.ipc {
            ipc.send(&report.sentence);
        }
        if let (Some(cache), Some(pos)) = (&self.cache, report.position) {
            cache.lock().unwrap_or_else(PoisonError::into_inner).update(pos);
        }
    }
}

/// A decoder bound to one channel of an interleaved stream, plus its sinks.
pub struct Receiver {
    label: char,
    channels: usize,
    offset: usize,
    decoder: Box<dyn Decoder>,
    sinks: Sinks,
    samples: Vec<i16>,
    reports: Vec<Report>,
}

impl Receiver {
    /// `channels` is the interleave of the buffers passed to `run`;
    /// `offset` selects which of them this receiver decodes.
    pub fn new(
        label: char,
        channels: usize,
        offset: usize,
        decoder: Box<dyn Decoder>,
        sinks: Sinks,
    ) -> Result<Self, String> {
        if offset >= channels {
            return Err(format!(
                "receiver {}: channel offset {} out of range for {} channel(s)",
                label, offset, channels
            ));
        }
        log::debug!("initializing demodulator {}", label);
        Ok(Self {
            label,
            channels,
            offset,
            decoder,
            sinks,
            samples: Vec::new(),
            reports: Vec::new(),
        })
    }

    pub fn label(&self) -> char {
        self.label
    }

    /// Decode `frames` frames of the interleaved `buffer`.
    pub fn run(&mut self, buffer: &[i16], frames: usize) {
        self.samples.clear();
        self.samples.extend(
            buffer
                .iter()
                .skip(self.offset)
                .step_by(self.channels)
                .take(frames),
        );

        self.decoder.process(&self.samples, &mut self.reports);

        for report in self.reports.drain(..) {
            self.sinks.publish(report);
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        log::debug!("receiver {} destroyed", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ais_output::cache::PositionCache;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records the samples it is given and emits one report per call.
    struct Probe {
        seen: Rc<RefCell<Vec<i16>>>,
        calls: u64,
    }

    impl Decoder for Probe {
        fn process(&mut self, samples: &[i16], out: &mut Vec<Report>) {
            self.seen.borrow_mut().extend_from_slice(samples);
            self.calls += 1;
            out.push(Report {
                sentence: format!("!TEST,{}", self.calls),
                position: Some(Position {
                    mmsi: 100 + self.calls as u32,
                    latitude: 1.0,
                    longitude: 2.0,
                    course: None,
                    speed: None,
                    heading: None,
                    received_at: 0,
                }),
            });
        }

        fn stats(&self) -> DecoderStats {
            DecoderStats {
                received_frames: self.calls,
                ..Default::default()
            }
        }
    }

    fn probe() -> (Box<Probe>, Rc<RefCell<Vec<i16>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        (Box::new(Probe { seen: seen.clone(), calls: 0 }), seen)
    }

    #[test]
    fn test_extracts_right_channel() {
        let (dec, seen) = probe();
        let mut rx = Receiver::new('A', 2, 1, dec, Sinks::default()).unwrap();
        rx.run(&[10, 11, 20, 21, 30, 31, 40, 41], 3);
        assert_eq!(*seen.borrow(), vec![11, 21, 31]);
        assert_eq!(rx.stats().received_frames, 1);
    }

    #[test]
    fn test_mono_passthrough() {
        let (dec, seen) = probe();
        let mut rx = Receiver::new('A', 1, 0, dec, Sinks::default()).unwrap();
        rx.run(&[1, 2, 3, 4], 4);
        assert_eq!(*seen.borrow(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_offset_out_of_range() {
        let (dec, _) = probe();
        assert!(Receiver::new('B', 1, 1, dec, Sinks::default()).is_err());
    }

    #[test]
    fn test_reports_reach_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let serial_path = dir.path().join("tty");
        std::fs::write(&serial_path, b"").unwrap();
        let serial = SerialSink::open(&serial_path).unwrap();
        let cache = PositionCache::init(8, 0).unwrap();

        let sinks = Sinks {
            serial: Some(serial.clone()),
            ipc: None,
            cache: Some(cache.clone()),
        };
        let (dec, _) = probe();
        let mut rx = Receiver::new('A', 1, 0, dec, sinks).unwrap();
        rx.run(&[0; 8], 8);
        rx.run(&[0; 8], 8);

        assert_eq!(serial.sent(), 2);
        assert_eq!(cache.lock().unwrap().len(), 2);
        let text = std::fs::read_to_string(&serial_path).unwrap();
        assert_eq!(text, "!TEST,1\r\n!TEST,2\r\n");
    }

    #[test]
    fn test_stats_display() {
        let s = DecoderStats {
            received_frames: 3,
            lost_frames: 2,
            lost_frames2: 1,
        };
        assert_eq!(
            s.to_string(),
            "Received correctly: 3 packets, wrong CRC: 2 packets, wrong size: 1 packets"
        );
    }
}
