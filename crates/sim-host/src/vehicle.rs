//! Point-mass longitudinal vehicle that turns transmission torque into
//! wheel speed, and wheel speed back into a drive speed demand.

use std::f64::consts::PI;

const GRAVITY_M_S2: f64 = 9.81;

#[derive(Debug, Clone)]
pub struct VehicleParameters {
    pub mass_kg: f64,
    pub tire_radius_m: f64,
    pub final_drive_ratio: f64,
    /// 0.5 * air density * Cd * frontal area.
    pub drag_n_per_m2_s2: f64,
    pub rolling_resistance: f64,
    /// Transmission input speed held by the slipping clutch at launch.
    pub launch_rpm: f64,
}

impl Default for VehicleParameters {
    fn default() -> Self {
        Self {
            mass_kg: 1597.0,
            tire_radius_m: 0.254,
            final_drive_ratio: 3.42,
            drag_n_per_m2_s2: 0.42,
            rolling_resistance: 0.012,
            launch_rpm: 1500.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Vehicle {
    params: VehicleParameters,
    speed_m_s: f64,
    distance_m: f64,
}

impl Vehicle {
    pub fn new(params: VehicleParameters) -> Self {
        Self {
            params,
            speed_m_s: 0.0,
            distance_m: 0.0,
        }
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed_m_s * 3.6
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    fn wheel_rpm(&self) -> f64 {
        self.speed_m_s / self.params.tire_radius_m * 30.0 / PI
    }

    /// Transmission output speed the wheels impose, in RPM.
    ///
    /// Below launch speed the clutch slips and holds the transmission input
    /// at `launch_rpm` for the engaged `gear_ratio`.
    pub fn drive_speed_demand(&self, gear_ratio: f64) -> f64 {
        let from_wheels = self.wheel_rpm() * self.params.final_drive_ratio;
        if gear_ratio > 0.0 {
            from_wheels.max(self.params.launch_rpm / gear_ratio)
        } else {
            from_wheels
        }
    }

    /// Integrate one tick given torque at the transmission output.
    pub fn step(&mut self, transmission_torque_nm: f64, dt_s: f64) {
        let torque = if transmission_torque_nm.is_finite() {
            transmission_torque_nm
        } else {
            0.0
        };
        let tractive = torque * self.params.final_drive_ratio / self.params.tire_radius_m;
        let drag = self.params.drag_n_per_m2_s2 * self.speed_m_s * self.speed_m_s;
        let rolling = if self.speed_m_s > 0.0 || tractive > 0.0 {
            self.params.rolling_resistance * self.params.mass_kg * GRAVITY_M_S2
        } else {
            0.0
        };

        let accel = (tractive - drag - rolling) / self.params.mass_kg;
        self.speed_m_s = (self.speed_m_s + accel * dt_s).max(0.0);
        self.distance_m += self.speed_m_s * dt_s;
    }
}

impl Default for Vehicle {
    fn default() -> Self {
        Self::new(VehicleParameters::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_torque_accelerates() {
        let mut vehicle = Vehicle::default();
        for _ in 0..60 {
            vehicle.step(400.0, 1.0 / 60.0);
        }
        assert!(vehicle.speed_kmh() > 5.0);
        assert!(vehicle.distance_m() > 0.0);
    }

    #[test]
    fn stationary_vehicle_does_not_roll_backwards() {
        let mut vehicle = Vehicle::default();
        vehicle.step(-500.0, 0.1);
        assert_eq!(vehicle.speed_kmh(), 0.0);
        vehicle.step(f64::NAN, 0.1);
        assert_eq!(vehicle.speed_kmh(), 0.0);
    }

    #[test]
    fn launch_clutch_holds_demand_at_standstill() {
        let vehicle = Vehicle::default();
        let demand = vehicle.drive_speed_demand(2.97);
        assert!((demand * 2.97 - 1500.0).abs() < 1e-9);
        assert_eq!(vehicle.drive_speed_demand(0.0), 0.0);
    }
}
