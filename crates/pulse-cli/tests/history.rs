use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::path::PathBuf;

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../test_data/history.jsonl")
}

fn list(extra: &[&str]) -> Vec<Value> {
    let path = fixture();
    let mut cmd = cargo_bin_cmd!("pulse");
    let output = cmd
        .args(["history", "--path", path.to_str().unwrap()])
        .args(extra)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn lists_newest_first_skipping_bad_lines() {
    let records = list(&[]);
    let times: Vec<u64> = records.iter().map(|r| r["time"].as_u64().unwrap()).collect();
    assert_eq!(times, vec![1_700_000_300, 1_700_000_200, 1_700_000_100]);
    assert_eq!(records[0]["analysis_type"], "readiness");
    assert_eq!(records[0]["stress_index"].as_f64().unwrap(), 7.9);
    assert!(records[1].get("stress_index").is_none());
}

#[test]
fn limit_keeps_newest() {
    let records = list(&["--limit", "1"]);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"], 1_700_000_300u64);
}

#[test]
fn missing_history_is_empty() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("none.jsonl");
    let mut cmd = cargo_bin_cmd!("pulse");
    let output = cmd
        .args(["history", "--path", path.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "[]");
}
