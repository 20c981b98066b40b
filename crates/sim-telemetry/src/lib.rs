pub mod diagnostics;
pub mod metrics;

pub use diagnostics::PrometheusDiagnostics;
pub use metrics::{init_metrics, record_output, render_metrics, serve_metrics};
