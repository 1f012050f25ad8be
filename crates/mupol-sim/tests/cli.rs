#![allow(clippy::unwrap_used)]
//! Runs the simulation binary end to end.

use std::{io::Write, path::PathBuf, process::Command};

use serde_json::Value;

fn mupol_sim() -> Command {
    Command::new(PathBuf::from(env!("CARGO_BIN_EXE_mupol-sim")))
}

#[test]
fn simulate_small_problem_as_json() {
    let output = mupol_sim()
        .args([
            "--parties=2",
            "--num-freighters=2",
            "--num-orders=3",
            "--num-nodes=4",
            "--bit-length=8",
            "--dummy-node=255",
            "--dummy-freighter-id=255",
            "--random-seed=7",
            "--json",
        ])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let outcomes: Value = serde_json::from_slice(&output.stdout).unwrap();
    let outcomes = outcomes.as_array().unwrap();
    assert_eq!(outcomes.len(), 2);
    for (party, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome["party"], party);
        let orders = outcome["orders"].as_array().unwrap();
        assert_eq!(orders.len(), 3);
        for order in orders {
            assert!(order["freighter"].as_u64().unwrap() < 2);
        }
    }
    let freighters = |outcome: &Value| -> Vec<Value> {
        outcome["orders"]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["freighter"].clone())
            .collect()
    };
    assert_eq!(freighters(&outcomes[0]), freighters(&outcomes[1]));
}

#[test]
fn rejects_sentinel_inside_the_map() {
    let output = mupol_sim()
        .args(["--num-nodes=9", "--dummy-node=3", "--num-orders=1"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("dummy node"), "{stderr}");
}

fn config_file(json: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

#[test]
fn reads_config_file_and_lets_flags_override_it() {
    let file = config_file(
        r#"{
            "dispatch": { "bit_length": 8, "dummy_node": 255, "dummy_freighter_id": 255 },
            "problem": { "parties": 2, "num_freighters": 2, "num_orders": 4, "random_seed": 7 }
        }"#,
    );
    let output = mupol_sim()
        .arg(format!("--config={}", file.path().display()))
        .args(["--num-orders=2", "--json"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let outcomes: Value = serde_json::from_slice(&output.stdout).unwrap();
    let outcomes = outcomes.as_array().unwrap();
    assert_eq!(outcomes.len(), 2);
    for outcome in outcomes {
        assert_eq!(outcome["orders"].as_array().unwrap().len(), 2);
    }
}

#[test]
fn rejects_invalid_config_file() {
    let file = config_file(r#"{ "dispatch": { "bit_length": 8, "unknown": 1 } }"#);
    let output = mupol_sim()
        .arg(format!("--config={}", file.path().display()))
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid config file"), "{stderr}");
}
