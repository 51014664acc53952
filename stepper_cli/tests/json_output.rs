use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[bus]
ports = ["A", "B"]

[sim]
step_period_us = 0
connected = ["A", "B"]
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

/// Validate the JSON line for a successful move.
#[rstest]
fn move_json_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = Command::cargo_bin("stepper")
        .unwrap()
        .arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .args(["move", "--port", "B", "--to", "-25"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8_lossy(&out);
    let line = stdout
        .lines()
        .find(|l| l.contains("\"position\""))
        .unwrap_or("")
        .to_string();
    assert!(
        !line.is_empty(),
        "no JSON line with position found; stdout was: {stdout}"
    );

    let v: serde_json::Value = serde_json::from_str(&line).expect("valid JSON");
    assert_eq!(v.get("command").and_then(|x| x.as_str()), Some("move"));
    assert_eq!(v.get("port").and_then(|x| x.as_str()), Some("B"));
    assert_eq!(v.get("target").and_then(|x| x.as_i64()), Some(-25));
    assert_eq!(v.get("position").and_then(|x| x.as_i64()), Some(-25));
    assert_eq!(v.get("moves").and_then(|x| x.as_u64()), Some(1));
    assert!(v.get("duration_ms").and_then(|x| x.as_u64()).is_some());
}

/// Errors under --json are a single structured object on stderr.
#[rstest]
fn error_json_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = Command::cargo_bin("stepper")
        .unwrap()
        .arg("--json")
        .arg("--log-level")
        .arg("off")
        .arg("--config")
        .arg(&cfg)
        .args(["move", "--port", "C", "--to", "1"])
        .assert()
        .code(3)
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8_lossy(&out);
    let line = stderr
        .lines()
        .find(|l| l.contains("\"reason\""))
        .unwrap_or("")
        .to_string();
    let v: serde_json::Value = serde_json::from_str(&line).expect("valid JSON");
    assert_eq!(v["reason"], "NotConnected");
    assert_eq!(v["port"], "C");
    assert!(v["message"].as_str().unwrap().contains("port C"));
}

/// A move that ends short of its target is an error, not a result line.
#[rstest]
fn unreached_target_json_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = Command::cargo_bin("stepper")
        .unwrap()
        .arg("--json")
        .arg("--log-level")
        .arg("off")
        .arg("--config")
        .arg(&cfg)
        .args(["move", "--port", "A", "--to", "12", "--speed", "0"])
        .assert()
        .code(5)
        .get_output()
        .clone();
    assert!(!String::from_utf8_lossy(&out.stdout).contains("\"position\""));
    let stderr = String::from_utf8_lossy(&out.stderr);
    let line = stderr.lines().find(|l| l.contains("\"reason\"")).unwrap_or("");
    let v: serde_json::Value = serde_json::from_str(line).expect("valid JSON");
    assert_eq!(v["reason"], "NotReached");
    assert_eq!(v["port"], "A");
}
