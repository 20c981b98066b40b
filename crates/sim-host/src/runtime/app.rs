use crate::error::HostError;
use crate::infra::audit::{AuditEventType, AuditLogger, AuditedDiagnostics};
use crate::runtime::clock::{HostClock, TickPacer};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry;
use crate::vehicle::Vehicle;
use sim_bridge::{
    BridgeConfig, EngineControl, EngineParameters, Input, Output, SimulatedEngine,
    SimulationBridge, StepBounds, NEUTRAL_GEAR,
};
use sim_telemetry::PrometheusDiagnostics;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Shift up once the crank passes this fraction of redline.
const SHIFT_UP_FRACTION: f64 = 0.9;
const SHIFT_COOLDOWN: Duration = Duration::from_millis(750);

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub ticks: u64,
    pub missed_ticks: u64,
    pub worker_cycles: u64,
    pub stale_samples: u64,
    pub final_output: Output,
    pub vehicle_speed_kmh: f64,
    pub distance_m: f64,
}

pub fn run_from_args() -> ExitCode {
    let config = RuntimeConfig::from_env();
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }
    match run(config) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "sim-host failed");
            ExitCode::FAILURE
        }
    }
}

pub fn run(config: RuntimeConfig) -> Result<RunSummary, HostError> {
    init_tracing(config.json_logs);
    telemetry::init();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let clock = HostClock::new();
    let audit = init_audit_logger(config.audit_path.as_deref(), clock)?;
    if let Some(audit) = &audit {
        audit.record(
            AuditEventType::SystemStart,
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "tick_hz": config.tick_hz,
                "throttle": config.throttle,
                "metrics_enabled": config.metrics_addr.is_some(),
            }),
        );
    }

    if !(config.tick_hz.is_finite() && config.tick_hz > 0.0) {
        return Err(HostError::InvalidTickRate(config.tick_hz));
    }
    let params = load_engine_parameters(config.engine_path.as_deref())?;
    let gear_ratios = params.gear_ratios.clone();
    let engine_name = params.name.clone();

    let bridge_config = BridgeConfig {
        step_bounds: StepBounds::new(config.min_step_s, config.max_step_s)?,
        max_lag_cycles: config.max_lag_cycles,
        ..BridgeConfig::default()
    };
    let diagnostics = AuditedDiagnostics::new(audit.clone(), PrometheusDiagnostics::new());
    let mut bridge = SimulationBridge::new(bridge_config).with_diagnostics(Arc::new(diagnostics));

    bridge.send_control(EngineControl::StartUp)?;
    bridge.send_control(EngineControl::SpeedControl(config.throttle * config.throttle))?;
    bridge.start(move || SimulatedEngine::new(params))?;

    if let Some(audit) = &audit {
        audit.record(
            AuditEventType::EngineLoaded,
            serde_json::json!({
                "name": engine_name,
                "gear_count": gear_ratios.len(),
                "min_step_s": bridge.config().step_bounds.min_s(),
                "max_step_s": bridge.config().step_bounds.max_s(),
            }),
        );
    }
    info!(
        tick_hz = config.tick_hz,
        throttle = config.throttle,
        run_seconds = ?config.run_seconds,
        "Driving loop running"
    );

    let result = drive(&mut bridge, &config, &gear_ratios);
    let shutdown = bridge.stop();

    if let Some(audit) = &audit {
        audit.record(
            AuditEventType::SystemShutdown,
            serde_json::json!({
                "worker_cycles": shutdown.stats.cycles_executed,
                "clamped_steps": shutdown.stats.clamped_steps,
                "simulated_time_s": shutdown.stats.simulated_time_s,
                "stale_samples": shutdown.staleness.stale_samples,
                "fault": shutdown.fault.as_ref().map(|fault| fault.to_string()),
                "ok": result.is_ok(),
            }),
        );
    }

    let mut summary = result?;
    summary.worker_cycles = shutdown.stats.cycles_executed;
    summary.stale_samples = shutdown.staleness.stale_samples;
    info!(
        ticks = summary.ticks,
        missed_ticks = summary.missed_ticks,
        worker_cycles = summary.worker_cycles,
        stale_samples = summary.stale_samples,
        speed_kmh = summary.vehicle_speed_kmh,
        distance_m = summary.distance_m,
        final_gear = summary.final_output.current_gear,
        final_rpm = summary.final_output.rotational_speed_rpm,
        "Run complete"
    );
    Ok(summary)
}

/// The host tick: read output, move the vehicle, issue controls, submit input.
fn drive(
    bridge: &mut SimulationBridge<SimulatedEngine>,
    config: &RuntimeConfig,
    gear_ratios: &[f64],
) -> Result<RunSummary, HostError> {
    let mut pacer = TickPacer::new(Duration::from_secs_f64(1.0 / config.tick_hz));
    let dt_s = pacer.period().as_secs_f64();
    let deadline = config
        .run_seconds
        .map(|seconds| Instant::now() + Duration::from_secs(seconds));
    let status_every = config.tick_hz.round().max(1.0) as u64;

    let mut vehicle = Vehicle::default();
    let mut summary = RunSummary::default();
    let mut starter_engaged = true;
    let mut last_shift = Instant::now();

    while deadline.map_or(true, |deadline| Instant::now() < deadline) {
        pacer.wait();
        summary.ticks += 1;

        let sample = bridge.sample_output()?;
        telemetry::record_sample(&sample);
        let output = sample.output;
        vehicle.step(output.torque_nm, dt_s);

        let running = output.rotational_speed_rpm > 1000.0;
        if starter_engaged && running {
            bridge.send_control(EngineControl::Starter(false))?;
            starter_engaged = false;
            debug!(rpm = output.rotational_speed_rpm, "Engine running, starter released");
        }
        if running && output.current_gear == NEUTRAL_GEAR {
            bridge.send_control(EngineControl::Gear(0))?;
            last_shift = Instant::now();
        } else if output.rotational_speed_rpm > output.redline_rpm * SHIFT_UP_FRACTION
            && output.current_gear + 1 < output.gear_count
            && last_shift.elapsed() > SHIFT_COOLDOWN
        {
            bridge.send_control(EngineControl::ShiftUp)?;
            last_shift = Instant::now();
            info!(
                from_gear = output.current_gear,
                rpm = output.rotational_speed_rpm,
                "Shifting up"
            );
        }

        let ratio = usize::try_from(output.current_gear)
            .ok()
            .and_then(|gear| gear_ratios.get(gear).copied())
            .unwrap_or(0.0);
        bridge.submit_input(Input::new(dt_s, vehicle.drive_speed_demand(ratio), true))?;

        if summary.ticks % status_every == 0 {
            info!(
                rpm = output.rotational_speed_rpm,
                torque_nm = output.torque_nm,
                power_kw = output.power_kw,
                gear = output.current_gear,
                lag_cycles = sample.staleness.lag_cycles(),
                speed_kmh = vehicle.speed_kmh(),
                "Simulation status"
            );
        }
        summary.final_output = output;
    }

    summary.missed_ticks = pacer.missed();
    summary.vehicle_speed_kmh = vehicle.speed_kmh();
    summary.distance_m = vehicle.distance_m();
    if summary.missed_ticks > 0 {
        warn!(missed_ticks = summary.missed_ticks, "Driving loop missed ticks");
    }
    Ok(summary)
}

fn load_engine_parameters(path: Option<&Path>) -> Result<EngineParameters, HostError> {
    let Some(path) = path else {
        return Ok(EngineParameters::default());
    };
    let raw = std::fs::read_to_string(path).map_err(|source| HostError::EngineFile {
        path: path.to_path_buf(),
        source,
    })?;
    let params: EngineParameters =
        serde_json::from_str(&raw).map_err(|source| HostError::EngineJson {
            path: path.to_path_buf(),
            source,
        })?;
    info!(path = %path.display(), name = %params.name, "Loaded engine parameters");
    Ok(params)
}

fn init_audit_logger(
    path: Option<&Path>,
    clock: HostClock,
) -> Result<Option<Arc<AuditLogger>>, HostError> {
    let Some(path) = path else {
        return Ok(None);
    };
    let logger = AuditLogger::new(path, clock).map_err(|source| HostError::Audit {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "Audit logging enabled");
    Ok(Some(Arc::new(logger)))
}
