use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::path::PathBuf;
use tempfile::tempdir;

fn fast_config() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../test_data/fast_session.toml")
}

fn live(args: &[&str]) -> Value {
    let config = fast_config();
    let mut cmd = cargo_bin_cmd!("pulse");
    let output = cmd
        .args(["live", "--config", config.to_str().unwrap()])
        .args(args)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn timed_session_ends_at_deadline_and_saves() {
    let temp = tempdir().unwrap();
    let history = temp.path().join("history.jsonl");
    let json = live(&["--mode", "basic", "--history", history.to_str().unwrap()]);
    assert_eq!(json["outcome"]["status"], "recorded");
    assert_eq!(json["outcome"]["stop_reason"], "deadline");
    assert!(json["hrv"]["mean_hr"].as_f64().unwrap() > 0.0);
    assert_eq!(std::fs::read_to_string(&history).unwrap().lines().count(), 1);
}

#[test]
fn timed_session_stopped_early_is_insufficient() {
    let json = live(&["--mode", "basic", "--stop-after-ms", "800"]);
    assert_eq!(json["outcome"]["status"], "insufficient_data");
    assert_eq!(json["outcome"]["reason"], "aborted");
}

#[test]
fn untimed_session_stops_on_request() {
    let json = live(&["--stop-after-ms", "2000"]);
    assert_eq!(json["outcome"]["status"], "recorded");
    assert_eq!(json["outcome"]["mode"], "live");
    assert_eq!(json["outcome"]["stop_reason"], "requested");
}
