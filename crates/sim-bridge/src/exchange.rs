use crate::engine::SimulationEngine;
use crate::error::WorkerFault;
use crate::slot::DoubleBufferedSlot;
use serde::{Deserialize, Serialize};

/// Per-tick input from the driving loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Input {
    /// Host tick length in seconds. Clamped by the worker, so any value is accepted.
    pub delta_time_s: f64,
    /// Transmission output speed the wheels are forcing (RPM).
    pub drive_speed_demand_rpm: f64,
    pub ground_contact: bool,
    /// Stamped by the bridge on submit.
    pub sequence_id: u64,
}

impl Input {
    pub fn new(delta_time_s: f64, drive_speed_demand_rpm: f64, ground_contact: bool) -> Self {
        Self {
            delta_time_s,
            drive_speed_demand_rpm,
            ground_contact,
            sequence_id: 0,
        }
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::new(1.0 / 60.0, 0.0, false)
    }
}

/// Engine state published by the worker after each cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// Torque at the transmission output (engine torque times gear ratio).
    pub torque_nm: f64,
    pub rotational_speed_rpm: f64,
    pub redline_rpm: f64,
    pub power_kw: f64,
    pub name: String,
    pub current_gear: i32,
    pub gear_count: i32,
    /// Echo of the input `sequence_id` that produced this output.
    pub sequence_id: u64,
}

impl Output {
    pub fn from_engine<E: SimulationEngine + ?Sized>(engine: &E, sequence_id: u64) -> Self {
        Self {
            torque_nm: engine.torque() * engine.gear_ratio(),
            rotational_speed_rpm: engine.rotational_speed(),
            redline_rpm: engine.redline(),
            power_kw: engine.power(),
            name: engine.name().to_string(),
            current_gear: engine.gear(),
            gear_count: engine.gear_count(),
            sequence_id,
        }
    }

    /// First non-finite numeric field, if any.
    pub fn non_finite_field(&self) -> Option<&'static str> {
        [
            ("torque_nm", self.torque_nm),
            ("rotational_speed_rpm", self.rotational_speed_rpm),
            ("redline_rpm", self.redline_rpm),
            ("power_kw", self.power_kw),
        ]
        .into_iter()
        .find(|(_, value)| !value.is_finite())
        .map(|(field, _)| field)
    }

    pub(crate) fn check_finite(&self, cycle: u64) -> Result<(), WorkerFault> {
        match self.non_finite_field() {
            Some(field) => Err(WorkerFault::NonFiniteOutput { cycle, field }),
            None => Ok(()),
        }
    }
}

/// Slots shared between the producer, the worker and output consumers.
pub struct StateExchange {
    input: DoubleBufferedSlot<Input>,
    output: DoubleBufferedSlot<Output>,
    /// Output the producer most recently read, for consumers that must
    /// agree with what the driving loop applied.
    observed: DoubleBufferedSlot<Output>,
}

impl StateExchange {
    pub fn new() -> Self {
        Self {
            input: DoubleBufferedSlot::new(Input::default()),
            output: DoubleBufferedSlot::new(Output::default()),
            observed: DoubleBufferedSlot::new(Output::default()),
        }
    }

    /// Called by the producer once per host tick.
    pub fn submit_input(&self, input: Input) {
        self.input.write(input);
    }

    /// Called by the worker at the start of a cycle.
    pub fn read_input(&self) -> Input {
        self.input.read()
    }

    /// Called by the worker at the end of a cycle.
    pub fn publish_output(&self, output: Output) {
        self.output.write(output);
    }

    /// Called by the producer, on its own schedule.
    pub fn read_output(&self) -> Output {
        self.output.read()
    }

    pub fn record_observed(&self, output: Output) {
        self.observed.write(output);
    }

    pub fn last_observed(&self) -> Output {
        self.observed.read()
    }
}

impl Default for StateExchange {
    fn default() -> Self {
        Self::new()
    }
}
