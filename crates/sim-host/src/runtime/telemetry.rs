use sim_bridge::OutputSample;
use sim_telemetry::metrics::{init_metrics, serve_metrics, OUTPUT_LAG_CYCLES};
use std::thread;
use tracing::info;

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

/// Per-tick gauges the worker-side sink cannot see.
pub fn record_sample(sample: &OutputSample) {
    OUTPUT_LAG_CYCLES.set(i64::try_from(sample.staleness.lag_cycles()).unwrap_or(i64::MAX));
}
