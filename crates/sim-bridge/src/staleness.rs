use crate::diagnostics::StalenessReport;
use std::sync::atomic::{AtomicU64, Ordering};

/// How far the published output trails the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Current { lag_cycles: u64 },
    Lagging { lag_cycles: u64 },
}

impl Staleness {
    pub fn lag_cycles(&self) -> u64 {
        match self {
            Self::Current { lag_cycles } | Self::Lagging { lag_cycles } => *lag_cycles,
        }
    }

    pub fn is_lagging(&self) -> bool {
        matches!(self, Self::Lagging { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct StalenessStats {
    pub samples: u64,
    pub stale_samples: u64,
    pub worst_lag_cycles: u64,
}

/// Compares output sequence ids against the last submitted one.
///
/// A lag of up to `max_lag_cycles` is normal: the producer usually reads the
/// output for tick N-1 right before it submits tick N.
#[derive(Debug)]
pub struct StalenessMonitor {
    max_lag_cycles: u64,
    samples: AtomicU64,
    stale_samples: AtomicU64,
    consecutive: AtomicU64,
    worst_lag: AtomicU64,
}

impl StalenessMonitor {
    pub fn new(max_lag_cycles: u64) -> Self {
        Self {
            max_lag_cycles,
            samples: AtomicU64::new(0),
            stale_samples: AtomicU64::new(0),
            consecutive: AtomicU64::new(0),
            worst_lag: AtomicU64::new(0),
        }
    }

    pub fn max_lag_cycles(&self) -> u64 {
        self.max_lag_cycles
    }

    /// Classify one sample. Returns a report when the sample is stale.
    pub fn observe(
        &self,
        last_submitted: u64,
        output_sequence: u64,
    ) -> (Staleness, Option<StalenessReport>) {
        let lag_cycles = last_submitted.saturating_sub(output_sequence);
        self.samples.fetch_add(1, Ordering::Relaxed);
        self.worst_lag.fetch_max(lag_cycles, Ordering::Relaxed);

        if lag_cycles <= self.max_lag_cycles {
            self.consecutive.store(0, Ordering::Relaxed);
            return (Staleness::Current { lag_cycles }, None);
        }

        self.stale_samples.fetch_add(1, Ordering::Relaxed);
        let consecutive = self.consecutive.fetch_add(1, Ordering::Relaxed) + 1;
        let report = StalenessReport {
            last_submitted,
            output_sequence,
            lag_cycles,
            max_lag_cycles: self.max_lag_cycles,
            consecutive,
        };
        (Staleness::Lagging { lag_cycles }, Some(report))
    }

    pub fn stats(&self) -> StalenessStats {
        StalenessStats {
            samples: self.samples.load(Ordering::Relaxed),
            stale_samples: self.stale_samples.load(Ordering::Relaxed),
            worst_lag_cycles: self.worst_lag.load(Ordering::Relaxed),
        }
    }
}

impl Default for StalenessMonitor {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lag_within_threshold_is_current() {
        let monitor = StalenessMonitor::new(1);
        let (state, report) = monitor.observe(5, 4);
        assert_eq!(state, Staleness::Current { lag_cycles: 1 });
        assert!(report.is_none());
    }

    #[test]
    fn lag_beyond_threshold_reports() {
        let monitor = StalenessMonitor::new(1);
        let (state, report) = monitor.observe(10, 6);
        assert!(state.is_lagging());
        let report = report.unwrap();
        assert_eq!(report.lag_cycles, 4);
        assert_eq!(report.consecutive, 1);

        let (_, report) = monitor.observe(11, 6);
        assert_eq!(report.unwrap().consecutive, 2);

        // Catching up resets the episode.
        let (state, _) = monitor.observe(12, 12);
        assert_eq!(state.lag_cycles(), 0);
        let (_, report) = monitor.observe(20, 12);
        assert_eq!(report.unwrap().consecutive, 1);
    }

    #[test]
    fn output_ahead_of_counter_is_not_negative() {
        let monitor = StalenessMonitor::new(0);
        let (state, _) = monitor.observe(3, 5);
        assert_eq!(state, Staleness::Current { lag_cycles: 0 });
    }

    #[test]
    fn stats_accumulate() {
        let monitor = StalenessMonitor::new(2);
        monitor.observe(1, 1);
        monitor.observe(9, 1);
        monitor.observe(10, 9);
        let stats = monitor.stats();
        assert_eq!(stats.samples, 3);
        assert_eq!(stats.stale_samples, 1);
        assert_eq!(stats.worst_lag_cycles, 8);
    }
}
