//! JSONL audit trail of simulation lifecycle events.

use crate::runtime::clock::HostClock;
use serde::{Deserialize, Serialize};
use sim_bridge::{CycleReport, DiagnosticsSink, StalenessReport, WorkerFault};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    SystemStart,
    /// Engine built on the worker thread and bridge running
    EngineLoaded,
    /// First stale sample of a lagging episode
    SimulationStale,
    WorkerFault,
    SystemShutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic microseconds since host start
    pub timestamp_us: u64,
    pub unix_us: u64,
    pub event_type: AuditEventType,
    pub details: serde_json::Value,
}

/// Appends one JSON object per line; safe to share across threads.
pub struct AuditLogger {
    writer: Mutex<BufWriter<File>>,
    clock: HostClock,
}

impl AuditLogger {
    /// Opens `path` for append, creating parent directories as needed.
    pub fn new(path: &Path, clock: HostClock) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::with_capacity(8192, file)),
            clock,
        })
    }

    pub fn log(&self, entry: &AuditEntry) -> std::io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_writer(&mut *writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    /// Stamp and write an event. Failures are logged, never propagated.
    pub fn record(&self, event_type: AuditEventType, details: serde_json::Value) {
        let entry = AuditEntry {
            timestamp_us: self.clock.now_us(),
            unix_us: self.clock.unix_us(),
            event_type,
            details,
        };
        if let Err(err) = self.log(&entry) {
            tracing::warn!(error = %err, event = ?entry.event_type, "Failed to write audit entry");
        }
    }
}

/// Diagnostics sink that writes stale episodes and faults to the audit
/// trail before forwarding to `inner`.
pub struct AuditedDiagnostics<S> {
    audit: Option<Arc<AuditLogger>>,
    inner: S,
}

impl<S: DiagnosticsSink> AuditedDiagnostics<S> {
    pub fn new(audit: Option<Arc<AuditLogger>>, inner: S) -> Self {
        Self { audit, inner }
    }
}

impl<S: DiagnosticsSink> DiagnosticsSink for AuditedDiagnostics<S> {
    fn stale_output(&self, report: &StalenessReport) {
        if let (Some(audit), 1) = (&self.audit, report.consecutive) {
            audit.record(
                AuditEventType::SimulationStale,
                serde_json::json!({
                    "last_submitted": report.last_submitted,
                    "output_sequence": report.output_sequence,
                    "lag_cycles": report.lag_cycles,
                    "max_lag_cycles": report.max_lag_cycles,
                }),
            );
        }
        self.inner.stale_output(report);
    }

    fn worker_fault(&self, fault: &WorkerFault) {
        if let Some(audit) = &self.audit {
            audit.record(
                AuditEventType::WorkerFault,
                serde_json::json!({ "fault": fault.to_string() }),
            );
        }
        self.inner.worker_fault(fault);
    }

    fn cycle_completed(&self, report: &CycleReport) {
        self.inner.cycle_completed(report);
    }
}
