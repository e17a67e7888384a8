use crate::agc::{Agc, SquelchState};
use crate::{Decoder, DecoderStats, Report};

/// One AIS slot is 256 bits at 9600 baud: 1280 samples at 48 kHz
pub const SAMPLES_PER_SLOT: usize = 1280;

/// Shortest plausible transmission (about 200 bits incl. training/flags)
const MIN_BURST_SAMPLES: usize = 1000;

/// Longest transmission spans five slots
const MAX_BURST_SAMPLES: usize = SAMPLES_PER_SLOT * 5;

/// Hang time before a burst is considered finished (5 symbols)
const SQUELCH_TIMEOUT: u32 = 25;

/// Default squelch threshold in dBFS
pub const DEFAULT_SQUELCH_DB: f32 = -40.0;

/// Squelch-gated burst detector.
///
/// Stands in for a protocol decoder: every burst that passes the squelch is
/// measured; bursts of a plausible AIS length count as received frames and
/// the rest as size-check failures. It emits no reports.
pub struct BurstDecoder {
    agc: Agc,
    capturing: bool,
    burst_len: usize,
    stats: DecoderStats,
}

impl BurstDecoder {
    pub fn new(squelch_db: f32) -> Self {
        Self {
            agc: Agc::new(0.25, squelch_db, SQUELCH_TIMEOUT),
            capturing: false,
            burst_len: 0,
            stats: DecoderStats::default(),
        }
    }

    fn finish_burst(&mut self) {
        // The hang time is not part of the burst
        let len = self.burst_len.saturating_sub(SQUELCH_TIMEOUT as usize);
        if (MIN_BURST_SAMPLES..=MAX_BURST_SAMPLES).contains(&len) {
            self.stats.received_frames += 1;
        } else {
            self.stats.lost_frames2 += 1;
        }
        log::trace!("burst of {} samples at {:.1} dBFS", len, self.agc.rssi_db());
        self.burst_len = 0;
    }
}

impl Decoder for BurstDecoder {
    fn process(&mut self, samples: &[i16], _out: &mut Vec<Report>) {
        for &s in samples {
            let (_, state) = self.agc.execute(s as f32 / 32768.0);
            match state {
                SquelchState::Rise => {
                    self.capturing = true;
                    self.burst_len = 1;
                }
                SquelchState::SignalHi => {
                    if self.capturing {
                        self.burst_len += 1;
                    }
                }
                SquelchState::Timeout => {
                    if self.capturing {
                        self.capturing = false;
                        self.finish_burst();
                    }
                }
                SquelchState::SignalLo => {}
            }
        }
    }

    fn stats(&self) -> DecoderStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(decoder: &mut BurstDecoder, samples: &[i16]) {
        let mut out = Vec::new();
        decoder.process(samples, &mut out);
        assert!(out.is_empty());
    }

    fn tone(len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| ((i as f32 * 0.3).sin() * 16000.0) as i16)
            .collect()
    }

    #[test]
    fn test_silence_counts_nothing() {
        let mut dec = BurstDecoder::new(DEFAULT_SQUELCH_DB);
        run(&mut dec, &vec![0i16; 48_000]);
        assert_eq!(dec.stats(), DecoderStats::default());
    }

    #[test]
    fn test_slot_length_burst_is_received() {
        let mut dec = BurstDecoder::new(DEFAULT_SQUELCH_DB);
        run(&mut dec, &vec![0i16; 4800]);
        run(&mut dec, &tone(SAMPLES_PER_SLOT));
        run(&mut dec, &vec![0i16; 4800]);
        let stats = dec.stats();
        assert_eq!(stats.received_frames, 1);
        assert_eq!(stats.lost_frames2, 0);
    }

    #[test]
    fn test_short_burst_fails_size_check() {
        let mut dec = BurstDecoder::new(DEFAULT_SQUELCH_DB);
        run(&mut dec, &vec![0i16; 4800]);
        run(&mut dec, &tone(200));
        run(&mut dec, &vec![0i16; 4800]);
        let stats = dec.stats();
        assert_eq!(stats.received_frames, 0);
        assert_eq!(stats.lost_frames2, 1);
    }
}
