//! Runs a simulation engine on a dedicated worker thread, driven by a
//! real-time loop that submits inputs and reads back outputs without blocking.

pub mod bridge;
pub mod clamp;
pub mod command;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod signal;
#[cfg(feature = "simulation")]
pub mod sim_engine;
pub mod slot;
pub mod staleness;
pub mod tags;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod worker;

pub use bridge::{BridgeConfig, OutputSample, ShutdownReport, SimulationBridge};
pub use clamp::{Clamped, StepAdjustment, StepBounds, StepDelta, Unclamped};
pub use command::{CommandQueue, CommandSender, EngineControl, SimulationCommand};
pub use diagnostics::{CycleReport, DiagnosticsSink, StalenessReport, TracingDiagnostics};
pub use engine::{SimulationEngine, NEUTRAL_GEAR};
pub use error::{BridgeError, ConfigError, EngineError, WorkerFault};
pub use exchange::{Input, Output, StateExchange};
pub use signal::{Wake, WakeSignal};
#[cfg(feature = "simulation")]
pub use sim_engine::{EngineParameters, SimulatedEngine};
pub use slot::DoubleBufferedSlot;
pub use staleness::{Staleness, StalenessMonitor, StalenessStats};
pub use worker::{ExecutionStats, WorkerState, WorkerStatus};
