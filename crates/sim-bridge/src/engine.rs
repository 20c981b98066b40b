use std::time::Duration;

/// Gear index used for neutral.
pub const NEUTRAL_GEAR: i32 = -1;

/// Narrow interface to the engine/vehicle/transmission solver.
///
/// Only the worker thread ever calls these methods, so implementations need
/// no internal locking. Forward gears are `0..gear_count()`; `-1` is neutral.
pub trait SimulationEngine: Send + 'static {
    /// Advance internal state. The bridge clamps `dt` before calling.
    fn advance(&mut self, dt: Duration);

    fn torque(&self) -> f64;
    fn rotational_speed(&self) -> f64;
    fn redline(&self) -> f64;
    fn power(&self) -> f64;
    fn gear(&self) -> i32;
    fn gear_count(&self) -> i32;
    fn gear_ratio(&self) -> f64;
    fn name(&self) -> &str;

    fn set_speed_control(&mut self, value: f64);
    fn set_dyno_enabled(&mut self, enabled: bool);
    fn set_dyno_speed(&mut self, speed: f64);
    fn set_gear(&mut self, gear: i32);
    fn set_ignition_enabled(&mut self, enabled: bool);
    fn set_starter_enabled(&mut self, enabled: bool);

    /// Checked by the worker after every step; `false` is a fatal fault.
    fn is_healthy(&self) -> bool {
        true
    }
}

impl<E: SimulationEngine + ?Sized> SimulationEngine for Box<E> {
    fn advance(&mut self, dt: Duration) {
        (**self).advance(dt)
    }

    fn torque(&self) -> f64 {
        (**self).torque()
    }

    fn rotational_speed(&self) -> f64 {
        (**self).rotational_speed()
    }

    fn redline(&self) -> f64 {
        (**self).redline()
    }

    fn power(&self) -> f64 {
        (**self).power()
    }

    fn gear(&self) -> i32 {
        (**self).gear()
    }

    fn gear_count(&self) -> i32 {
        (**self).gear_count()
    }

    fn gear_ratio(&self) -> f64 {
        (**self).gear_ratio()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn set_speed_control(&mut self, value: f64) {
        (**self).set_speed_control(value)
    }

    fn set_dyno_enabled(&mut self, enabled: bool) {
        (**self).set_dyno_enabled(enabled)
    }

    fn set_dyno_speed(&mut self, speed: f64) {
        (**self).set_dyno_speed(speed)
    }

    fn set_gear(&mut self, gear: i32) {
        (**self).set_gear(gear)
    }

    fn set_ignition_enabled(&mut self, enabled: bool) {
        (**self).set_ignition_enabled(enabled)
    }

    fn set_starter_enabled(&mut self, enabled: bool) {
        (**self).set_starter_enabled(enabled)
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }
}
