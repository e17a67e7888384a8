use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock seconds. Deliberately not monotonic: the stats timer has to
/// cope with the system clock being stepped.
pub fn wall_clock() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

/// Periodic statistics trigger, checked once per loop iteration.
pub struct StatsTimer {
    interval: u64,
    last: i64,
}

impl StatsTimer {
    /// `interval` in seconds; 0 disables the timer.
    pub fn new(interval: u64, now: i64) -> Self {
        Self { interval, last: now }
    }

    pub fn enabled(&self) -> bool {
        self.interval > 0
    }

    /// True when stats should be emitted now.
    pub fn due(&mut self, now: i64) -> bool {
        if self.interval == 0 {
            return false;
        }
        if now < self.last {
            // clock jumped backwards
            self.last = now;
            return false;
        }
        if (now - self.last) as u64 >= self.interval {
            self.last = now;
            return true;
        }
        false
    }
}
