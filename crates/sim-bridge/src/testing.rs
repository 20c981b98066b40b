//! Instrumented engine double for exercising the bridge without a solver.

use crate::engine::{SimulationEngine, NEUTRAL_GEAR};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeEvent {
    Advance(Duration),
    Marker(u64),
}

/// Observations shared between a [`RecordingEngine`] on the worker thread
/// and the test that owns the bridge.
#[derive(Debug, Default)]
pub struct EngineProbe {
    pub events: Vec<ProbeEvent>,
    pub total_time: Duration,
    /// Dyno speed seen by each advance, `None` while decoupled.
    pub dyno_at_advance: Vec<Option<f64>>,
}

impl EngineProbe {
    pub fn advances(&self) -> Vec<Duration> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ProbeEvent::Advance(dt) => Some(*dt),
                ProbeEvent::Marker(_) => None,
            })
            .collect()
    }

    pub fn markers(&self) -> Vec<u64> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ProbeEvent::Marker(id) => Some(*id),
                ProbeEvent::Advance(_) => None,
            })
            .collect()
    }
}

pub type SharedProbe = Arc<Mutex<EngineProbe>>;

/// Fault to inject on a given advance (1-based).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InjectedFault {
    PanicAt(u64),
    UnhealthyAt(u64),
    NanTorqueAt(u64),
}

pub struct RecordingEngine {
    pub speed_control: f64,
    pub dyno_enabled: bool,
    pub dyno_speed: f64,
    pub gear: i32,
    pub ignition: bool,
    pub starter: bool,
    pub rpm: f64,
    pub base_torque: f64,
    pub gear_ratios: Vec<f64>,
    pub name: String,
    pub step_delay: Option<Duration>,
    pub fault: Option<InjectedFault>,
    advances: u64,
    healthy: bool,
    probe: Option<SharedProbe>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            speed_control: 0.0,
            dyno_enabled: false,
            dyno_speed: 0.0,
            gear: NEUTRAL_GEAR,
            ignition: false,
            starter: false,
            rpm: 800.0,
            base_torque: 100.0,
            gear_ratios: vec![2.97, 2.07, 1.43, 1.00, 0.84, 0.56],
            name: "recording".to_string(),
            step_delay: None,
            fault: None,
            advances: 0,
            healthy: true,
            probe: None,
        }
    }

    /// Engine plus a handle to what it observes.
    pub fn probed() -> (Self, SharedProbe) {
        let probe = SharedProbe::default();
        let mut engine = Self::new();
        engine.probe = Some(Arc::clone(&probe));
        (engine, probe)
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    pub fn with_fault(mut self, fault: InjectedFault) -> Self {
        self.fault = Some(fault);
        self
    }

    /// Record a marker; used by test commands to show where they ran.
    pub fn mark(&mut self, id: u64) {
        self.record(ProbeEvent::Marker(id));
    }

    pub fn advances(&self) -> u64 {
        self.advances
    }

    fn record(&self, event: ProbeEvent) {
        if let Some(probe) = &self.probe {
            let mut probe = probe.lock().unwrap_or_else(PoisonError::into_inner);
            if let ProbeEvent::Advance(dt) = event {
                probe.total_time += dt;
                let dyno = self.dyno_enabled.then_some(self.dyno_speed);
                probe.dyno_at_advance.push(dyno);
            }
            probe.events.push(event);
        }
    }
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationEngine for RecordingEngine {
    fn advance(&mut self, dt: Duration) {
        self.advances += 1;
        if let Some(delay) = self.step_delay {
            std::thread::sleep(delay);
        }
        match self.fault {
            Some(InjectedFault::PanicAt(n)) if n == self.advances => {
                panic!("injected fault at advance {n}");
            }
            Some(InjectedFault::UnhealthyAt(n)) if n == self.advances => {
                self.healthy = false;
            }
            Some(InjectedFault::NanTorqueAt(n)) if n == self.advances => {
                self.base_torque = f64::NAN;
            }
            _ => {}
        }
        self.record(ProbeEvent::Advance(dt));
    }

    fn torque(&self) -> f64 {
        self.base_torque * self.speed_control.max(0.1)
    }

    fn rotational_speed(&self) -> f64 {
        self.rpm
    }

    fn redline(&self) -> f64 {
        6500.0
    }

    fn power(&self) -> f64 {
        self.torque() * self.rpm * std::f64::consts::PI / 30.0 / 1000.0
    }

    fn gear(&self) -> i32 {
        self.gear
    }

    fn gear_count(&self) -> i32 {
        self.gear_ratios.len() as i32
    }

    fn gear_ratio(&self) -> f64 {
        usize::try_from(self.gear)
            .ok()
            .and_then(|idx| self.gear_ratios.get(idx).copied())
            .unwrap_or(0.0)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_speed_control(&mut self, value: f64) {
        self.speed_control = value;
    }

    fn set_dyno_enabled(&mut self, enabled: bool) {
        self.dyno_enabled = enabled;
    }

    fn set_dyno_speed(&mut self, speed: f64) {
        self.dyno_speed = speed;
    }

    fn set_gear(&mut self, gear: i32) {
        self.gear = gear;
    }

    fn set_ignition_enabled(&mut self, enabled: bool) {
        self.ignition = enabled;
    }

    fn set_starter_enabled(&mut self, enabled: bool) {
        self.starter = enabled;
    }

    fn is_healthy(&self) -> bool {
        self.healthy
    }
}
