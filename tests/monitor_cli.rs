use std::process::Command;

use serde_json::Value;

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_monitor_cli"))
}

fn run_json(args: &[&str]) -> (Option<i32>, Value) {
    let output = cli().args(args).output().expect("run monitor_cli");
    let stdout = String::from_utf8(output.stdout).expect("stdout utf8");
    let value = serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("invalid JSON ({e}): {stdout}"));
    (output.status.code(), value)
}

#[test]
fn ladder_prints_all_candidates_in_order() {
    let (code, value) = run_json(&["ladder", "--platform-min", "2048", "--floor", "256"]);
    assert_eq!(code, Some(0));

    let rows = value.as_array().expect("ladder rows");
    let tiers: Vec<&str> = rows.iter().map(|r| r["tier"].as_str().unwrap()).collect();
    assert_eq!(tiers, vec!["ultra-low", "low", "standard", "conservative"]);

    assert_eq!(rows[0]["buffer_frames"], 512);
    let total = rows[0]["latency"]["total_ms"].as_f64().unwrap();
    assert!((total - 23.333).abs() < 0.01);
}

#[test]
fn simulate_falls_back_to_third_candidate() {
    let (code, value) = run_json(&["simulate", "--fail-first", "2", "--millis", "50"]);
    assert_eq!(code, Some(0));

    assert_eq!(value["started"], true);
    assert_eq!(value["tier"], "standard");
    assert_eq!(value["sample_rate_hz"], 44100);
    assert_eq!(value["attempts"], 3);
    assert_eq!(value["state_while_running"], "monitoring");
    assert_eq!(value["open_handles_after_stop"], 0);
}

#[test]
fn simulate_reports_exhausted_ladder() {
    let (code, value) = run_json(&["simulate", "--fail-first", "4", "--fail-point", "input-open"]);
    assert_eq!(code, Some(2));

    assert_eq!(value["started"], false);
    assert_eq!(value["error_code"], "NO_VALID_CONFIGURATION");
    assert_eq!(value["latency_ms"], 0.0);
    assert_eq!(value["open_handles_after_stop"], 0);
}

#[test]
fn simulate_reports_denied_permission() {
    let (code, value) = run_json(&["simulate", "--deny-permission"]);
    assert_eq!(code, Some(2));

    assert_eq!(value["error_code"], "PERMISSION_DENIED");
    assert_eq!(value["attempts"], 0);
}
