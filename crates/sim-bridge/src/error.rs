use std::fmt;
use thiserror::Error;

/// Failure to build or attach a simulation engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("engine parameter `{field}` is invalid: {reason}")]
    InvalidParameter { field: &'static str, reason: String },
    #[error("engine has no forward gears")]
    NoGears,
    #[error("engine factory failed: {0}")]
    Factory(String),
}

/// Rejected bridge configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("step bounds must satisfy 0 < min <= max (min={min_s}, max={max_s})")]
    InvalidStepBounds { min_s: f64, max_s: f64 },
}

/// Why the worker thread stopped advancing the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerFault {
    /// The engine reported itself unhealthy after a step.
    EngineUnhealthy { cycle: u64 },
    /// A getter produced NaN or infinity.
    NonFiniteOutput { cycle: u64, field: &'static str },
    /// The engine panicked inside `advance` or a getter.
    Panicked { cycle: u64, message: String },
    /// The worker thread exited without reporting a reason.
    ThreadLost,
}

impl fmt::Display for WorkerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EngineUnhealthy { cycle } => {
                write!(f, "engine unhealthy after cycle {cycle}")
            }
            Self::NonFiniteOutput { cycle, field } => {
                write!(f, "non-finite `{field}` after cycle {cycle}")
            }
            Self::Panicked { cycle, message } => {
                write!(f, "engine panicked during cycle {cycle}: {message}")
            }
            Self::ThreadLost => write!(f, "worker thread exited unexpectedly"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge already started")]
    AlreadyStarted,
    #[error("bridge not started")]
    NotStarted,
    #[error("bridge stopped")]
    Stopped,
    #[error("engine configuration failed: {0}")]
    Configuration(#[from] EngineError),
    #[error("invalid bridge configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("simulation unavailable: {fault}")]
    SimulationUnavailable { fault: WorkerFault },
}

impl BridgeError {
    /// True when the error means the simulation will never produce output again.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SimulationUnavailable { .. } | Self::Stopped)
    }
}
