use sim_bridge::StepBounds;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub run_seconds: Option<u64>,
    pub tick_hz: f64,
    /// Pedal position in `[0, 1]`.
    pub throttle: f64,
    pub engine_path: Option<PathBuf>,
    pub max_lag_cycles: u64,
    pub min_step_s: f64,
    pub max_step_s: f64,
    pub json_logs: bool,
    pub metrics_addr: Option<String>,
    pub audit_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            run_seconds: None,
            tick_hz: 60.0,
            throttle: 0.8,
            engine_path: None,
            max_lag_cycles: 1,
            min_step_s: StepBounds::DEFAULT_MIN_S,
            max_step_s: StepBounds::DEFAULT_MAX_S,
            json_logs: false,
            metrics_addr: None,
            audit_path: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    /// Unparseable values keep their defaults.
    pub fn from_args(args: &[String]) -> Self {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1);
            match args[i].as_str() {
                "--run-seconds" => {
                    if let Some(v) = value {
                        cfg.run_seconds = v.parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--tick-hz" => {
                    if let Some(v) = value {
                        cfg.tick_hz = v.parse().unwrap_or(cfg.tick_hz);
                        i += 1;
                    }
                }
                "--throttle" => {
                    if let Some(v) = value {
                        cfg.throttle = v.parse::<f64>().unwrap_or(cfg.throttle).clamp(0.0, 1.0);
                        i += 1;
                    }
                }
                "--engine" => {
                    if let Some(v) = value {
                        cfg.engine_path = Some(PathBuf::from(v));
                        i += 1;
                    }
                }
                "--max-lag" => {
                    if let Some(v) = value {
                        cfg.max_lag_cycles = v.parse().unwrap_or(cfg.max_lag_cycles);
                        i += 1;
                    }
                }
                "--min-step" => {
                    if let Some(v) = value {
                        cfg.min_step_s = v.parse().unwrap_or(cfg.min_step_s);
                        i += 1;
                    }
                }
                "--max-step" => {
                    if let Some(v) = value {
                        cfg.max_step_s = v.parse().unwrap_or(cfg.max_step_s);
                        i += 1;
                    }
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--metrics-addr" => {
                    if let Some(v) = value {
                        cfg.metrics_addr = Some(v.clone());
                        i += 1;
                    }
                }
                "--audit-log" => {
                    if let Some(v) = value {
                        cfg.audit_path = Some(PathBuf::from(v));
                        i += 1;
                    }
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                other => {
                    tracing::warn!(arg = other, "Ignoring unknown argument");
                }
            }
            i += 1;
        }
        cfg
    }

    pub fn print_help() {
        println!(
            r#"sim-host - drive a simulated engine through the asynchronous worker bridge

USAGE:
    sim-host [OPTIONS]

OPTIONS:
    --run-seconds <SECS>    Run for a fixed duration then exit
    --tick-hz <HZ>          Driving loop rate [default: 60]
    --throttle <0..1>       Pedal position held for the whole run [default: 0.8]
    --engine <PATH>         Engine parameters as JSON (missing fields use defaults)
    --max-lag <CYCLES>      Output lag tolerated before it is reported stale [default: 1]
    --min-step <SECS>       Smallest step handed to the engine [default: 0.005]
    --max-step <SECS>       Largest step handed to the engine [default: 0.0333]
    --json-logs             Output logs in JSON format
    --metrics-addr <ADDR>   Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    --audit-log <PATH>      Append audit events to a JSONL file
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,sim_bridge=trace)

EXAMPLES:
    # Ten second run with metrics
    sim-host --run-seconds 10 --metrics-addr 127.0.0.1:9090

    # Custom engine, slow host tick, audit trail
    sim-host --engine v8.json --tick-hz 30 --audit-log /tmp/sim-audit.jsonl
"#
        );
    }
}
