//! Stable metric names and help text for published simulation values.

#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub metric: &'static str,
    pub help: &'static str,
}

pub const ENGINE_TORQUE_NM: Tag = Tag {
    metric: "enginesim_torque_newton_meters",
    help: "Transmission output torque in Nm",
};

pub const ENGINE_SPEED_RPM: Tag = Tag {
    metric: "enginesim_engine_speed_rpm",
    help: "Crankshaft speed in RPM",
};

pub const ENGINE_POWER_KW: Tag = Tag {
    metric: "enginesim_power_kilowatts",
    help: "Engine output power in kW",
};

pub const CURRENT_GEAR: Tag = Tag {
    metric: "enginesim_current_gear",
    help: "Engaged gear (-1 = neutral)",
};

pub const OUTPUT_LAG_CYCLES: Tag = Tag {
    metric: "enginesim_output_lag_cycles",
    help: "Cycles the latest output trails the last submitted input",
};

pub const CYCLE_TIME_US: Tag = Tag {
    metric: "enginesim_cycle_time_microseconds",
    help: "Worker cycle duration in microseconds",
};

pub const SEQUENCE_ID: Tag = Tag {
    metric: "enginesim_output_sequence_id",
    help: "Sequence id of the latest published output",
};
