//! Prometheus metrics for the simulation bridge.
//!
//! Worker counters are fed by [`crate::PrometheusDiagnostics`]; output
//! gauges are refreshed from every completed cycle.

use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};
use sim_bridge::{tags, Output};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Header, Response, Server};

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Worker Metrics
// ============================================================================

pub static CYCLES_EXECUTED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "enginesim_cycles_executed_total",
        "Simulation worker cycles completed",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static COMMANDS_APPLIED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "enginesim_commands_applied_total",
        "Queued engine commands applied by the worker",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Steps whose requested delta time fell outside the stable range
pub static CLAMPED_STEPS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "enginesim_clamped_steps_total",
        "Steps whose delta time was clamped into the stable range",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static CYCLE_TIME_US: LazyLock<Histogram> = LazyLock::new(|| {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(tags::CYCLE_TIME_US.metric, tags::CYCLE_TIME_US.help).buckets(vec![
            10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 16_667.0, 33_333.0,
        ]),
    )
    .unwrap();
    REGISTRY.register(Box::new(histogram.clone())).unwrap();
    histogram
});

pub static WORKER_FAULTS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "enginesim_worker_faults_total",
        "Simulation worker faults (unhealthy engine, non-finite output, panic)",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// 1 while the worker is producing output, 0 after a fault
pub static WORKER_UP: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new("enginesim_worker_up", "Simulation worker health (1=up, 0=down)")
        .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Staleness Metrics
// ============================================================================

pub static STALE_SAMPLES: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "enginesim_stale_samples_total",
        "Output samples lagging the driving loop beyond the threshold",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static OUTPUT_LAG_CYCLES: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge =
        IntGauge::new(tags::OUTPUT_LAG_CYCLES.metric, tags::OUTPUT_LAG_CYCLES.help).unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Engine Output Metrics
// ============================================================================

pub static ENGINE_TORQUE_NM: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(tags::ENGINE_TORQUE_NM.metric, tags::ENGINE_TORQUE_NM.help).unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

pub static ENGINE_SPEED_RPM: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(tags::ENGINE_SPEED_RPM.metric, tags::ENGINE_SPEED_RPM.help).unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

pub static ENGINE_POWER_KW: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(tags::ENGINE_POWER_KW.metric, tags::ENGINE_POWER_KW.help).unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

pub static CURRENT_GEAR: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new(tags::CURRENT_GEAR.metric, tags::CURRENT_GEAR.help).unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

pub static SEQUENCE_ID: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new(tags::SEQUENCE_ID.metric, tags::SEQUENCE_ID.help).unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Copy a published output into the engine gauges.
pub fn record_output(output: &Output) {
    ENGINE_TORQUE_NM.set(output.torque_nm);
    ENGINE_SPEED_RPM.set(output.rotational_speed_rpm);
    ENGINE_POWER_KW.set(output.power_kw);
    CURRENT_GEAR.set(i64::from(output.current_gear));
    SEQUENCE_ID.set(i64::try_from(output.sequence_id).unwrap_or(i64::MAX));
}

/// Text exposition of everything in [`REGISTRY`].
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Serve `/metrics`, `/health` and `/ready` on `bind_addr` from a background thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(server) => server,
            Err(err) => {
                tracing::error!(addr = %bind_addr, error = %err, "Failed to start metrics server");
                return;
            }
        };

        tracing::info!(addr = %bind_addr, "Metrics server listening on /metrics");

        for request in server.incoming_requests() {
            let response = match request.url() {
                "/metrics" => match render_metrics() {
                    Ok(body) => {
                        let mut response = Response::from_string(body);
                        if let Ok(header) = Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/plain; version=0.0.4"[..],
                        ) {
                            response = response.with_header(header);
                        }
                        response
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "Failed to encode metrics");
                        Response::from_string("Internal Server Error").with_status_code(500)
                    }
                },
                "/health" => Response::from_string("OK"),
                // Ready once the worker has published output and not faulted.
                "/ready" if CYCLES_EXECUTED.get() > 0 && WORKER_UP.get() == 1 => {
                    Response::from_string("Ready")
                }
                "/ready" => Response::from_string("Not Ready").with_status_code(503),
                _ => Response::from_string("Not Found").with_status_code(404),
            };
            let _ = request.respond(response);
        }
    })
}

/// Force registration of every metric so the first scrape lists them all.
pub fn init_metrics() {
    let _ = CYCLES_EXECUTED.get();
    let _ = COMMANDS_APPLIED.get();
    let _ = CLAMPED_STEPS.get();
    let _ = CYCLE_TIME_US.get_sample_count();
    let _ = WORKER_FAULTS.get();
    let _ = WORKER_UP.get();
    let _ = STALE_SAMPLES.get();
    let _ = OUTPUT_LAG_CYCLES.get();
    let _ = ENGINE_TORQUE_NM.get();
    let _ = ENGINE_SPEED_RPM.get();
    let _ = ENGINE_POWER_KW.get();
    let _ = CURRENT_GEAR.get();
    let _ = SEQUENCE_ID.get();
}
