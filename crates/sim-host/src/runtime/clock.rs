use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Timestamps for audit records.
#[derive(Debug, Clone, Copy)]
pub struct HostClock {
    start: Instant,
}

impl HostClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Monotonic microseconds since start.
    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    pub fn unix_us(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-rate tick schedule for the driving loop.
///
/// A tick that starts late is counted as missed and the schedule restarts
/// from now instead of bursting to catch up.
#[derive(Debug)]
pub struct TickPacer {
    period: Duration,
    next_tick: Instant,
    missed: u64,
}

impl TickPacer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_tick: Instant::now(),
            missed: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn missed(&self) -> u64 {
        self.missed
    }

    /// Sleep until the next tick is due.
    pub fn wait(&mut self) {
        let now = Instant::now();
        if now < self.next_tick {
            thread::sleep(self.next_tick - now);
            self.next_tick += self.period;
        } else {
            if now - self.next_tick > self.period {
                self.missed += 1;
            }
            self.next_tick = now + self.period;
        }
    }
}
