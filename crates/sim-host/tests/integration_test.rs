use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn host_binary() -> PathBuf {
    // Prefer the test-built binary when available to avoid extra cargo builds.
    if let Some(path) = option_env!("CARGO_BIN_EXE_sim-host") {
        return PathBuf::from(path);
    }
    let candidates = [
        "../../target/debug/sim-host",
        "target/debug/sim-host",
        "../../target/release/sim-host",
        "target/release/sim-host",
    ];
    candidates
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
        .expect("sim-host binary not found; expected CARGO_BIN_EXE_sim-host or target/{debug,release}")
}

fn run_host(args: &[&str]) -> Output {
    Command::new(host_binary())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run sim-host")
}

fn audit_events(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .expect("audit log missing")
        .lines()
        .map(|line| serde_json::from_str(line).expect("audit line is JSON"))
        .collect()
}

#[test]
fn help_prints_usage() {
    let output = run_host(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("USAGE"));
    assert!(stdout.contains("--tick-hz"));
}

#[test]
fn timed_run_writes_audit_trail() {
    let dir = tempfile::tempdir().unwrap();
    let audit = dir.path().join("audit.jsonl");
    let output = run_host(&[
        "--run-seconds",
        "1",
        "--audit-log",
        audit.to_str().unwrap(),
        "--json-logs",
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let events = audit_events(&audit);
    let kinds: Vec<&str> = events
        .iter()
        .filter_map(|event| event["event_type"].as_str())
        .collect();
    assert_eq!(kinds.first(), Some(&"system_start"));
    assert!(kinds.contains(&"engine_loaded"));
    assert_eq!(kinds.last(), Some(&"system_shutdown"));
    assert!(!kinds.contains(&"worker_fault"));

    let shutdown = events.last().unwrap();
    assert!(shutdown["details"]["worker_cycles"].as_u64().unwrap() > 0);
    assert_eq!(shutdown["details"]["ok"], true);
}

#[test]
fn custom_engine_file_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let engine = dir.path().join("engine.json");
    std::fs::write(&engine, r#"{"name": "Boxer-4", "gear_ratios": [3.2, 2.1, 1.4, 1.0]}"#)
        .unwrap();
    let audit = dir.path().join("audit.jsonl");

    let output = run_host(&[
        "--run-seconds",
        "1",
        "--engine",
        engine.to_str().unwrap(),
        "--audit-log",
        audit.to_str().unwrap(),
    ]);
    assert!(output.status.success());

    let loaded = audit_events(&audit)
        .into_iter()
        .find(|event| event["event_type"] == "engine_loaded")
        .expect("engine_loaded event");
    assert_eq!(loaded["details"]["name"], "Boxer-4");
    assert_eq!(loaded["details"]["gear_count"], 4);
}

#[test]
fn invalid_engine_file_fails_without_panicking() {
    let dir = tempfile::tempdir().unwrap();
    let engine = dir.path().join("engine.json");
    std::fs::write(&engine, r#"{"gear_ratios": []}"#).unwrap();

    let output = run_host(&["--run-seconds", "1", "--engine", engine.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stderr.contains("panicked"), "stderr: {stderr}");
}
