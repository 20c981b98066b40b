use crate::engine::{SimulationEngine, NEUTRAL_GEAR};
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::time::Duration;

const RPM_PER_RAD_S: f64 = 30.0 / PI;

/// Parameters for [`SimulatedEngine`]. Every field has a default, so a JSON
/// file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineParameters {
    pub name: String,
    pub idle_rpm: f64,
    pub stall_rpm: f64,
    pub peak_torque_nm: f64,
    pub peak_torque_rpm: f64,
    pub redline_rpm: f64,
    /// Crank plus flywheel inertia.
    pub inertia_kg_m2: f64,
    pub friction_base_nm: f64,
    pub friction_nm_per_krpm: f64,
    pub starter_torque_nm: f64,
    pub starter_cutoff_rpm: f64,
    pub dyno_stiffness_nm_per_rpm: f64,
    pub torque_filter_s: f64,
    pub simulation_frequency_hz: f64,
    pub gear_ratios: Vec<f64>,
}

impl Default for EngineParameters {
    fn default() -> Self {
        Self {
            name: "Inline-4 2.0L".to_string(),
            idle_rpm: 800.0,
            stall_rpm: 300.0,
            peak_torque_nm: 200.0,
            peak_torque_rpm: 4200.0,
            redline_rpm: 6500.0,
            inertia_kg_m2: 0.2,
            friction_base_nm: 10.0,
            friction_nm_per_krpm: 6.0,
            starter_torque_nm: 90.0,
            starter_cutoff_rpm: 600.0,
            dyno_stiffness_nm_per_rpm: 2.0,
            torque_filter_s: 0.05,
            simulation_frequency_hz: 2000.0,
            gear_ratios: vec![2.97, 2.07, 1.43, 1.00, 0.84, 0.56],
        }
    }
}

impl EngineParameters {
    pub fn validate(&self) -> Result<(), EngineError> {
        fn positive(field: &'static str, value: f64) -> Result<(), EngineError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(EngineError::InvalidParameter {
                    field,
                    reason: format!("must be finite and positive, got {value}"),
                })
            }
        }

        if self.name.trim().is_empty() {
            return Err(EngineError::InvalidParameter {
                field: "name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.gear_ratios.is_empty() {
            return Err(EngineError::NoGears);
        }
        for ratio in &self.gear_ratios {
            positive("gear_ratios", *ratio)?;
        }
        positive("idle_rpm", self.idle_rpm)?;
        positive("peak_torque_nm", self.peak_torque_nm)?;
        positive("peak_torque_rpm", self.peak_torque_rpm)?;
        positive("redline_rpm", self.redline_rpm)?;
        positive("inertia_kg_m2", self.inertia_kg_m2)?;
        positive("dyno_stiffness_nm_per_rpm", self.dyno_stiffness_nm_per_rpm)?;
        positive("simulation_frequency_hz", self.simulation_frequency_hz)?;
        if !(self.torque_filter_s.is_finite() && self.torque_filter_s >= 0.0) {
            return Err(EngineError::InvalidParameter {
                field: "torque_filter_s",
                reason: format!("must be finite and non-negative, got {}", self.torque_filter_s),
            });
        }
        if self.stall_rpm >= self.idle_rpm || self.idle_rpm >= self.redline_rpm {
            return Err(EngineError::InvalidParameter {
                field: "redline_rpm",
                reason: format!(
                    "expected stall < idle < redline, got {} / {} / {}",
                    self.stall_rpm, self.idle_rpm, self.redline_rpm
                ),
            });
        }
        Ok(())
    }
}

/// Lumped crank-inertia engine with a gearbox and a dyno load.
///
/// The dyno is a stiff spring between the crank and the wheel-side speed;
/// the torque it absorbs (low-pass filtered) is what the engine delivers.
#[derive(Debug, Clone)]
pub struct SimulatedEngine {
    params: EngineParameters,
    speed_rpm: f64,
    throttle: f64,
    ignition: bool,
    starter: bool,
    dyno_enabled: bool,
    dyno_speed_rpm: f64,
    gear: i32,
    load_torque_nm: f64,
    filtered_torque_nm: f64,
}

impl SimulatedEngine {
    pub fn new(params: EngineParameters) -> Result<Self, EngineError> {
        params.validate()?;
        Ok(Self {
            params,
            speed_rpm: 0.0,
            throttle: 0.0,
            ignition: false,
            starter: false,
            dyno_enabled: false,
            dyno_speed_rpm: 0.0,
            gear: NEUTRAL_GEAR,
            load_torque_nm: 0.0,
            filtered_torque_nm: 0.0,
        })
    }

    pub fn parameters(&self) -> &EngineParameters {
        &self.params
    }

    /// Full-throttle torque at `rpm`; zero at and above redline (fuel cut).
    fn torque_curve(&self, rpm: f64) -> f64 {
        if rpm >= self.params.redline_rpm {
            return 0.0;
        }
        let x = (rpm - self.params.peak_torque_rpm) / self.params.peak_torque_rpm;
        (self.params.peak_torque_nm * (1.0 - 0.6 * x * x)).max(0.0)
    }

    /// Throttle floor that keeps the engine near idle.
    fn idle_throttle(&self) -> f64 {
        (0.15 + (self.params.idle_rpm - self.speed_rpm) / self.params.idle_rpm).clamp(0.0, 0.4)
    }

    fn substep(&mut self, h: f64) {
        let rpm = self.speed_rpm;

        let combustion = if self.ignition && rpm >= self.params.stall_rpm {
            self.torque_curve(rpm) * self.throttle.max(self.idle_throttle())
        } else {
            0.0
        };
        let starter = if self.starter && rpm < self.params.starter_cutoff_rpm {
            self.params.starter_torque_nm
        } else {
            0.0
        };
        let friction = if rpm > 0.0 {
            self.params.friction_base_nm + self.params.friction_nm_per_krpm * rpm / 1000.0
        } else {
            0.0
        };
        let load = if self.dyno_enabled {
            self.params.dyno_stiffness_nm_per_rpm * (rpm - self.dyno_speed_rpm)
        } else {
            0.0
        };

        let net = combustion + starter - friction - load;
        let accel_rpm_s = net / self.params.inertia_kg_m2 * RPM_PER_RAD_S;
        self.speed_rpm = (rpm + accel_rpm_s * h).max(0.0);
        self.load_torque_nm = load;

        let blend = if self.params.torque_filter_s > 0.0 {
            h / (self.params.torque_filter_s + h)
        } else {
            1.0
        };
        self.filtered_torque_nm += (load - self.filtered_torque_nm) * blend;
    }
}

impl SimulationEngine for SimulatedEngine {
    fn advance(&mut self, dt: Duration) {
        let dt_s = dt.as_secs_f64();
        if dt_s <= 0.0 {
            return;
        }
        let steps = (dt_s * self.params.simulation_frequency_hz).ceil().max(1.0) as u64;
        let h = dt_s / steps as f64;
        for _ in 0..steps {
            self.substep(h);
        }
    }

    fn torque(&self) -> f64 {
        self.filtered_torque_nm
    }

    fn rotational_speed(&self) -> f64 {
        self.speed_rpm
    }

    fn redline(&self) -> f64 {
        self.params.redline_rpm
    }

    fn power(&self) -> f64 {
        self.filtered_torque_nm * self.speed_rpm / RPM_PER_RAD_S / 1000.0
    }

    fn gear(&self) -> i32 {
        self.gear
    }

    fn gear_count(&self) -> i32 {
        self.params.gear_ratios.len() as i32
    }

    fn gear_ratio(&self) -> f64 {
        usize::try_from(self.gear)
            .ok()
            .and_then(|idx| self.params.gear_ratios.get(idx).copied())
            .unwrap_or(0.0)
    }

    fn name(&self) -> &str {
        &self.params.name
    }

    fn set_speed_control(&mut self, value: f64) {
        self.throttle = if value.is_finite() {
            value.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    fn set_dyno_enabled(&mut self, enabled: bool) {
        self.dyno_enabled = enabled;
    }

    fn set_dyno_speed(&mut self, speed: f64) {
        self.dyno_speed_rpm = speed.max(0.0);
    }

    fn set_gear(&mut self, gear: i32) {
        self.gear = gear.clamp(NEUTRAL_GEAR, self.gear_count() - 1);
    }

    fn set_ignition_enabled(&mut self, enabled: bool) {
        self.ignition = enabled;
    }

    fn set_starter_enabled(&mut self, enabled: bool) {
        self.starter = enabled;
    }

    fn is_healthy(&self) -> bool {
        self.speed_rpm.is_finite()
            && self.filtered_torque_nm.is_finite()
            && self.load_torque_nm.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_for(engine: &mut SimulatedEngine, seconds: f64) {
        let frames = (seconds * 60.0) as usize;
        for _ in 0..frames {
            engine.advance(Duration::from_secs_f64(1.0 / 60.0));
        }
    }

    fn engine() -> SimulatedEngine {
        SimulatedEngine::new(EngineParameters::default()).unwrap()
    }

    #[test]
    fn starter_brings_engine_to_idle() {
        let mut engine = engine();
        engine.set_ignition_enabled(true);
        engine.set_starter_enabled(true);
        run_for(&mut engine, 1.0);
        engine.set_starter_enabled(false);
        run_for(&mut engine, 3.0);

        let rpm = engine.rotational_speed();
        assert!((600.0..1200.0).contains(&rpm), "idle rpm was {rpm}");
        assert!(engine.is_healthy());
    }

    #[test]
    fn fuel_cut_holds_engine_at_redline() {
        let mut engine = engine();
        engine.set_ignition_enabled(true);
        engine.set_starter_enabled(true);
        engine.set_speed_control(1.0);
        run_for(&mut engine, 5.0);

        let rpm = engine.rotational_speed();
        assert!(rpm <= engine.redline() + 200.0, "overspeed: {rpm}");
        assert!(rpm > engine.redline() - 500.0, "never reached redline: {rpm}");
    }

    #[test]
    fn dyno_holds_speed_and_measures_torque() {
        let mut engine = engine();
        engine.set_ignition_enabled(true);
        engine.set_starter_enabled(true);
        engine.set_gear(0);
        engine.set_dyno_enabled(true);
        engine.set_dyno_speed(3000.0);
        engine.set_speed_control(1.0);
        run_for(&mut engine, 3.0);

        let rpm = engine.rotational_speed();
        assert!((2900.0..3300.0).contains(&rpm), "dyno rpm was {rpm}");
        assert!(engine.torque() > 100.0, "torque was {}", engine.torque());
        assert!(engine.power() > 0.0);
    }

    #[test]
    fn neutral_has_zero_ratio_and_gear_is_bounded() {
        let mut engine = engine();
        assert_eq!(engine.gear(), NEUTRAL_GEAR);
        assert_eq!(engine.gear_ratio(), 0.0);
        engine.set_gear(99);
        assert_eq!(engine.gear(), 5);
        assert_eq!(engine.gear_ratio(), 0.56);
        engine.set_gear(-7);
        assert_eq!(engine.gear(), NEUTRAL_GEAR);
    }

    #[test]
    fn validate_rejects_bad_parameters() {
        let no_gears = EngineParameters {
            gear_ratios: vec![],
            ..EngineParameters::default()
        };
        assert_eq!(no_gears.validate(), Err(EngineError::NoGears));

        let bad_inertia = EngineParameters {
            inertia_kg_m2: 0.0,
            ..EngineParameters::default()
        };
        assert!(matches!(
            SimulatedEngine::new(bad_inertia),
            Err(EngineError::InvalidParameter { field: "inertia_kg_m2", .. })
        ));

        let inverted = EngineParameters {
            idle_rpm: 7000.0,
            ..EngineParameters::default()
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn parameters_parse_with_defaults() {
        let raw = r#"{"name":"V8 5.0L","peak_torque_nm":540.0,"gear_ratios":[3.1,2.0,1.3,1.0]}"#;
        let params: EngineParameters = serde_json::from_str(raw).unwrap();
        assert_eq!(params.name, "V8 5.0L");
        assert_eq!(params.redline_rpm, 6500.0);
        let engine = SimulatedEngine::new(params).unwrap();
        assert_eq!(engine.gear_count(), 4);
    }
}
