//! CLI integration tests for agentroute
//!
//! Tests the agentroute CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Isolated config and data directories for one test
struct Sandbox {
    config: TempDir,
    data: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            config: TempDir::new().unwrap(),
            data: TempDir::new().unwrap(),
        }
    }

    #[allow(deprecated)]
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("agentroute").unwrap();
        cmd.env("AGENTROUTE_CONFIG_DIR", self.config.path());
        cmd.env("AGENTROUTE_DATA_DIR", self.data.path());
        cmd.env_remove("RUST_LOG");
        cmd
    }
}

#[test]
fn test_help() {
    Sandbox::new()
        .cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("route"))
        .stdout(predicate::str::contains("feedback"))
        .stdout(predicate::str::contains("gate"));
}

#[test]
fn test_cold_route_picks_first_route() {
    Sandbox::new()
        .cmd()
        .args(["route", "implement user authentication"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Route: coder"))
        .stdout(predicate::str::contains("Exploration: no"));
}

#[test]
fn test_feedback_changes_route() {
    let sandbox = Sandbox::new();
    let context = "write integration tests for the parser";

    sandbox
        .cmd()
        .args(["feedback", context, "tester", "1.0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated tester"));

    assert!(sandbox.data.path().join("qlearning.json").exists());

    sandbox
        .cmd()
        .args(["--quiet", "route", context])
        .assert()
        .success()
        .stdout("tester\n");
}

#[test]
fn test_negative_feedback_is_accepted() {
    let sandbox = Sandbox::new();
    let output = sandbox
        .cmd()
        .args(["--format", "json", "feedback", "deploy to staging", "coder", "-0.5"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["route"], "coder");
    assert!(value["td_error"].as_f64().unwrap() < 0.0);
}

#[test]
fn test_feedback_unknown_route_fails() {
    Sandbox::new()
        .cmd()
        .args(["feedback", "anything", "pilot", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown route"));
}

#[test]
fn test_gate_random_embedding_json() {
    let output = Sandbox::new()
        .cmd()
        .args(["--format", "json", "gate", "--random", "--seed", "3"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let experts = value["result"]["experts"].as_array().unwrap();
    assert_eq!(experts.len(), 2);
    let total: f64 = experts.iter().map(|e| e["weight"].as_f64().unwrap()).sum();
    assert!((total - 1.0).abs() < 1e-5);
    assert!(value["grad_norm"].is_null());
}

#[test]
fn test_gate_with_reward_saves_snapshot() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["gate", "--random", "--reward", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Gradient norm"));
    assert!(sandbox.data.path().join("gating.json").exists());
}

#[test]
fn test_gate_rejects_wrong_dimension() {
    let sandbox = Sandbox::new();
    let path = sandbox.data.path().join("short.json");
    let values: Vec<f32> = vec![0.25; 100];
    std::fs::write(&path, serde_json::to_string(&values).unwrap()).unwrap();

    sandbox
        .cmd()
        .args(["gate", "--input"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("dimension mismatch"))
        .stderr(predicate::str::contains("Code: E100"))
        .stderr(predicate::str::contains("Suggestion: Produce embeddings of length 384"));
}

#[test]
fn test_plain_gate_persists_load_counts() {
    let sandbox = Sandbox::new();
    for seed in ["1", "2"] {
        sandbox
            .cmd()
            .args(["--quiet", "gate", "--random", "--seed", seed])
            .assert()
            .success();
    }
    assert!(sandbox.data.path().join("gating.json").exists());

    let output = sandbox.cmd().args(["--format", "json", "stats"]).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["gating"]["total_routes"], 2);
    assert_eq!(value["gating"]["total_updates"], 0);
    assert_eq!(value["load_balance"]["total"], 4);
}

#[test]
fn test_stats_json() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["feedback", "profile the hot path", "optimizer", "1"])
        .assert()
        .success();

    let output = sandbox.cmd().args(["--format", "json", "stats"]).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["qlearning"]["total_updates"], 1);
    assert_eq!(value["load_balance"]["experts"].as_array().unwrap().len(), 8);
}

#[test]
fn test_config_set_and_get() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["config", "set", "gating.top_k", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set gating.top_k = 3"));

    sandbox
        .cmd()
        .args(["config", "get", "gating.top_k"])
        .assert()
        .success()
        .stdout("3\n");

    let output = sandbox
        .cmd()
        .args(["--format", "json", "gate", "--random"])
        .output()
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["result"]["experts"].as_array().unwrap().len(), 3);
}

#[test]
fn test_config_rejects_invalid_value() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["config", "set", "qlearning.discount_factor", "1.5"])
        .assert()
        .failure();

    sandbox
        .cmd()
        .args(["config", "get", "qlearning.discount_factor"])
        .assert()
        .success()
        .stdout("0.95\n");
}

#[test]
fn test_config_path_uses_override() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"))
        .stdout(predicate::str::contains(
            sandbox.config.path().to_string_lossy().as_ref(),
        ));
}
