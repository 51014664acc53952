use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::{TempDir, tempdir};

fn write_config(dir: &TempDir) -> PathBuf {
    let toml = r#"
[bus]
ports = ["A", "B", "C"]

[sim]
step_period_us = 50
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn write_script(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("script.csv");
    fs::write(&path, body).unwrap();
    path
}

fn stepper(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("stepper").unwrap();
    cmd.arg("--config").arg(cfg);
    cmd
}

#[rstest]
fn rows_are_played_in_order_and_empty_cells_keep_targets() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    let script = write_script(&dir, "a,b,c,d\n10,,5,\n,20,,\n-4,,,\n");

    stepper(&cfg)
        .arg("script")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("row 2: A: 10, B: 0, C: 5"))
        .stdout(predicate::str::contains("row 3: A: 10, B: 20, C: 5"))
        .stdout(predicate::str::contains("row 4: A: -4, B: 20, C: 5"));
}

#[rstest]
fn json_rows_report_positions_per_port() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    let script = write_script(&dir, "a,b,c,d\n7,8,9,\n");

    let out = stepper(&cfg)
        .arg("--json")
        .arg("script")
        .arg(&script)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8_lossy(&out);
    let line = stdout.lines().find(|l| l.contains("\"row\"")).unwrap_or("");
    let v: serde_json::Value = serde_json::from_str(line).expect("valid JSON");
    assert_eq!(v["command"], "script");
    assert_eq!(v["row"], 2);
    assert_eq!(v["positions"]["A"], 7);
    assert_eq!(v["positions"]["B"], 8);
    assert_eq!(v["positions"]["C"], 9);
    assert!(v["positions"].get("D").is_none());
}

#[rstest]
#[case("x,y\n1,2\n", "Invalid headers in motion script")]
#[case("a,b,c,d\n", "motion script has no rows")]
#[case("a,b,c,d\n1,,,4\n", "not in bus.ports")]
#[case("a,b,c,d\nzz,,,\n", "invalid CSV row 2")]
fn bad_scripts_are_rejected(#[case] body: &str, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    let script = write_script(&dir, body);

    stepper(&cfg)
        .arg("script")
        .arg(&script)
        .assert()
        .code(1)
        .stderr(predicate::str::contains(needle));
}
