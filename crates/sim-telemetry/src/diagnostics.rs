use crate::metrics;
use sim_bridge::{CycleReport, DiagnosticsSink, StalenessReport, TracingDiagnostics, WorkerFault};

/// Diagnostics sink that updates the Prometheus registry, then hands the
/// report to `inner` (structured logs by default).
#[derive(Debug, Default, Clone)]
pub struct PrometheusDiagnostics<S = TracingDiagnostics> {
    inner: S,
}

impl PrometheusDiagnostics {
    pub fn new() -> Self {
        metrics::init_metrics();
        Self::default()
    }
}

impl<S: DiagnosticsSink> PrometheusDiagnostics<S> {
    pub fn wrapping(inner: S) -> Self {
        metrics::init_metrics();
        Self { inner }
    }
}

impl<S: DiagnosticsSink> DiagnosticsSink for PrometheusDiagnostics<S> {
    fn stale_output(&self, report: &StalenessReport) {
        metrics::STALE_SAMPLES.inc();
        metrics::OUTPUT_LAG_CYCLES.set(i64::try_from(report.lag_cycles).unwrap_or(i64::MAX));
        self.inner.stale_output(report);
    }

    fn worker_fault(&self, fault: &WorkerFault) {
        metrics::WORKER_FAULTS.inc();
        metrics::WORKER_UP.set(0);
        self.inner.worker_fault(fault);
    }

    fn cycle_completed(&self, report: &CycleReport) {
        metrics::CYCLES_EXECUTED.inc();
        metrics::COMMANDS_APPLIED.inc_by(report.commands_applied as u64);
        if report.step_adjustment.is_some() {
            metrics::CLAMPED_STEPS.inc();
        }
        metrics::CYCLE_TIME_US.observe(report.elapsed.as_secs_f64() * 1e6);
        metrics::WORKER_UP.set(1);
        metrics::record_output(&report.output);
        self.inner.cycle_completed(report);
    }
}
