//! Reporting seam toward whoever owns telemetry.
//!
//! The bridge never retries or corrects anything it reports here; a sink
//! only observes. Sinks are called from both the producer thread (staleness)
//! and the worker thread (cycles, faults), so they must be `Send + Sync`.

use crate::clamp::StepAdjustment;
use crate::error::WorkerFault;
use crate::exchange::Output;
use std::time::Duration;

/// Output lagging the producer by more than the configured number of cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct StalenessReport {
    pub last_submitted: u64,
    pub output_sequence: u64,
    pub lag_cycles: u64,
    pub max_lag_cycles: u64,
    /// Consecutive stale samples, including this one.
    pub consecutive: u64,
}

/// One completed worker cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub sequence_id: u64,
    pub commands_applied: usize,
    pub step: Duration,
    pub step_adjustment: Option<StepAdjustment>,
    pub elapsed: Duration,
    pub output: Output,
}

pub trait DiagnosticsSink: Send + Sync {
    fn stale_output(&self, report: &StalenessReport);

    fn worker_fault(&self, fault: &WorkerFault);

    fn cycle_completed(&self, _report: &CycleReport) {}
}

/// Default sink: structured log lines only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn stale_output(&self, report: &StalenessReport) {
        // First sample of an episode is a warning, the rest are noise.
        if report.consecutive == 1 {
            tracing::warn!(
                lag_cycles = report.lag_cycles,
                last_submitted = report.last_submitted,
                output_sequence = report.output_sequence,
                "Simulation behind driving loop"
            );
        } else {
            tracing::debug!(
                lag_cycles = report.lag_cycles,
                consecutive = report.consecutive,
                "Simulation still behind"
            );
        }
    }

    fn worker_fault(&self, fault: &WorkerFault) {
        tracing::error!(fault = %fault, "Simulation worker faulted");
    }

    fn cycle_completed(&self, report: &CycleReport) {
        if let Some(adjustment) = report.step_adjustment {
            tracing::trace!(cycle = report.cycle, ?adjustment, "Step clamped");
        }
    }
}
