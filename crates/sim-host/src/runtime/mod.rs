mod app;
pub mod clock;
mod config;
mod logging;
mod telemetry;

pub use app::run_from_args;
