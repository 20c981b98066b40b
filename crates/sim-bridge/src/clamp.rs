use crate::error::ConfigError;
use std::marker::PhantomData;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Unclamped;

#[derive(Debug, Clone, Copy)]
pub struct Clamped;

/// A simulation step length in seconds. Only `StepDelta<Clamped>` can be
/// turned into the `Duration` handed to the engine.
#[derive(Debug, Clone, Copy)]
pub struct StepDelta<State = Unclamped> {
    seconds: f64,
    adjustment: Option<StepAdjustment>,
    _state: PhantomData<State>,
}

/// Allowed step range in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepBounds {
    min_s: f64,
    max_s: f64,
}

/// Why a requested step was changed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepAdjustment {
    NonFinite { requested: f64 },
    BelowMinimum { requested: f64, limit: f64 },
    AboveMaximum { requested: f64, limit: f64 },
}

impl StepBounds {
    pub const DEFAULT_MIN_S: f64 = 1.0 / 200.0;
    pub const DEFAULT_MAX_S: f64 = 1.0 / 30.0;

    pub fn new(min_s: f64, max_s: f64) -> Result<Self, ConfigError> {
        let valid = min_s.is_finite() && max_s.is_finite() && min_s > 0.0 && min_s <= max_s;
        if !valid {
            return Err(ConfigError::InvalidStepBounds { min_s, max_s });
        }
        Ok(Self { min_s, max_s })
    }

    pub fn min_s(&self) -> f64 {
        self.min_s
    }

    pub fn max_s(&self) -> f64 {
        self.max_s
    }

    pub fn contains(&self, dt: Duration) -> bool {
        let secs = dt.as_secs_f64();
        // Duration round-trips through nanoseconds, allow one tick of slack.
        secs >= self.min_s - 1e-9 && secs <= self.max_s + 1e-9
    }
}

impl Default for StepBounds {
    fn default() -> Self {
        Self {
            min_s: Self::DEFAULT_MIN_S,
            max_s: Self::DEFAULT_MAX_S,
        }
    }
}

impl StepDelta<Unclamped> {
    pub fn new(seconds: f64) -> Self {
        Self {
            seconds,
            adjustment: None,
            _state: PhantomData,
        }
    }

    pub fn clamp(self, bounds: &StepBounds) -> StepDelta<Clamped> {
        let requested = self.seconds;
        let (seconds, adjustment) = if !requested.is_finite() {
            (bounds.min_s, Some(StepAdjustment::NonFinite { requested }))
        } else if requested < bounds.min_s {
            (
                bounds.min_s,
                Some(StepAdjustment::BelowMinimum {
                    requested,
                    limit: bounds.min_s,
                }),
            )
        } else if requested > bounds.max_s {
            (
                bounds.max_s,
                Some(StepAdjustment::AboveMaximum {
                    requested,
                    limit: bounds.max_s,
                }),
            )
        } else {
            (requested, None)
        };

        StepDelta {
            seconds,
            adjustment,
            _state: PhantomData,
        }
    }
}

impl StepDelta<Clamped> {
    pub fn seconds(&self) -> f64 {
        self.seconds
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.seconds)
    }

    pub fn adjustment(&self) -> Option<StepAdjustment> {
        self.adjustment
    }

    pub fn was_adjusted(&self) -> bool {
        self.adjustment.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_bounds() {
        let res = StepBounds::new(0.1, 0.01);
        assert!(matches!(res, Err(ConfigError::InvalidStepBounds { .. })));
        assert!(StepBounds::new(0.0, 0.01).is_err());
        assert!(StepBounds::new(f64::NAN, 0.01).is_err());
    }

    #[test]
    fn nan_clamps_to_minimum() {
        let step = StepDelta::new(f64::NAN).clamp(&StepBounds::default());
        assert_eq!(step.seconds(), StepBounds::DEFAULT_MIN_S);
        assert!(matches!(
            step.adjustment(),
            Some(StepAdjustment::NonFinite { .. })
        ));
    }

    #[test]
    fn zero_and_negative_clamp_to_minimum() {
        let bounds = StepBounds::default();
        for requested in [0.0, -0.016, -10.0] {
            let step = StepDelta::new(requested).clamp(&bounds);
            assert_eq!(step.seconds(), bounds.min_s());
            assert!(matches!(
                step.adjustment(),
                Some(StepAdjustment::BelowMinimum { .. })
            ));
        }
    }

    #[test]
    fn huge_step_clamps_to_maximum() {
        let step = StepDelta::new(10.0).clamp(&StepBounds::default());
        assert_eq!(step.seconds(), 1.0 / 30.0);
        assert!(matches!(
            step.adjustment(),
            Some(StepAdjustment::AboveMaximum { requested, .. }) if requested == 10.0
        ));
    }

    #[test]
    fn in_range_step_passes_through() {
        let step = StepDelta::new(0.016).clamp(&StepBounds::default());
        assert_eq!(step.seconds(), 0.016);
        assert!(!step.was_adjusted());
        assert!(StepBounds::default().contains(step.duration()));
    }
}
