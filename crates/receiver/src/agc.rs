/// Squelch gate output for one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquelchState {
    /// Below the threshold
    SignalLo,
    /// First sample above the threshold
    Rise,
    /// Open (above the threshold, or within the hang time)
    SignalHi,
    /// Closed after the hang time ran out
    Timeout,
}

/// Hysteresis-free squelch with a hang timer, in samples.
struct Gate {
    threshold_db: f32,
    hang: u32,
    quiet_for: u32,
    state: SquelchState,
}

impl Gate {
    fn step(&mut self, level_db: f32) -> SquelchState {
        let open = level_db > self.threshold_db;
        self.state = match (self.state, open) {
            (SquelchState::SignalLo | SquelchState::Timeout, true) => SquelchState::Rise,
            (SquelchState::SignalLo | SquelchState::Timeout, false) => SquelchState::SignalLo,
            (SquelchState::Rise, true) => {
                self.quiet_for = 0;
                SquelchState::SignalHi
            }
            (SquelchState::Rise, false) => SquelchState::SignalLo,
            (SquelchState::SignalHi, true) => {
                self.quiet_for = 0;
                SquelchState::SignalHi
            }
            (SquelchState::SignalHi, false) => {
                self.quiet_for += 1;
                if self.quiet_for >= self.hang {
                    SquelchState::Timeout
                } else {
                    SquelchState::SignalHi
                }
            }
        };
        self.state
    }
}

/// Automatic gain control for real-valued audio, with a squelch gate
/// driven by the level estimate.
///
/// The envelope `y` of the gained output is tracked with a one-pole filter
/// and the gain is nudged toward unit output with
///   g *= exp(-0.5 * alpha * ln(y))
/// which keeps the gain positive for any input level.
pub struct Agc {
    alpha: f32,
    gain: f32,
    envelope: f32,
    gate: Gate,
}

impl Agc {
    /// `bandwidth` is the loop coefficient (0..1), `squelch_timeout` the
    /// hang time in samples.
    pub fn new(bandwidth: f32, squelch_threshold_db: f32, squelch_timeout: u32) -> Self {
        Self {
            alpha: bandwidth,
            // Assume a weak signal until the loop settles
            gain: 1000.0,
            envelope: 1e-3,
            gate: Gate {
                threshold_db: squelch_threshold_db,
                hang: squelch_timeout,
                quiet_for: 0,
                state: SquelchState::SignalLo,
            },
        }
    }

    /// Input level estimate in dBFS (inverse of the gain)
    pub fn rssi_db(&self) -> f32 {
        -20.0 * self.gain.log10()
    }

    /// Gain one sample (full scale 1.0) and advance the squelch.
    pub fn execute(&mut self, input: f32) -> (f32, SquelchState) {
        let out = input * self.gain;
        self.envelope += self.alpha * (out.abs() - self.envelope);

        if self.envelope > 1e-6 {
            let step = (-0.5 * self.alpha * self.envelope.ln()).exp();
            self.gain = (self.gain * step).clamp(1e-6, 1e6);
        }

        let level = self.rssi_db();
        (out, self.gate.step(level))
    }

    pub fn set_squelch_threshold(&mut self, threshold_db: f32) {
        self.gate.threshold_db = threshold_db;
    }
}
