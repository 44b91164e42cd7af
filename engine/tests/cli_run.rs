//! CLI tests for `plan-engine run`, `show` and `runs`.
//!
//! Spawns the binary in a temp directory and verifies exit codes and the
//! artifacts written under the configured store path.

use std::fs;
use std::path::Path;
use std::process::Command;

use plan_engine::core::types::{ExecutionState, RunStatus, StopReason};
use plan_engine::exit_codes;
use plan_engine::io::config::{EngineConfig, write_config};
use plan_engine::test_support::plan_with_steps;

fn write_plan(dir: &Path, steps: usize) {
    let plan = plan_with_steps("plan-cli", steps);
    fs::write(
        dir.join("plan.json"),
        serde_json::to_string_pretty(&plan).expect("plan json"),
    )
    .expect("write plan");
}

fn plan_engine(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_plan-engine"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("run plan-engine")
}

#[test]
fn run_completes_and_writes_snapshot_and_log() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_plan(temp.path(), 3);

    let output = plan_engine(temp.path(), &["run", "--plan", "plan.json", "--run-id", "cli-1"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let printed: ExecutionState = serde_json::from_slice(&output.stdout).expect("stdout json");
    assert_eq!(printed.run_id, "cli-1");
    assert_eq!(printed.status, RunStatus::Completed);

    let run_dir = temp.path().join(".plan-engine/runs/cli-1");
    assert!(run_dir.join("snapshot.json").is_file());
    let log = fs::read_to_string(run_dir.join("log.jsonl")).expect("log");
    assert_eq!(log.lines().count(), 5);

    let shown = plan_engine(temp.path(), &["show", "--run-id", "cli-1"]);
    assert_eq!(shown.status.code(), Some(exit_codes::OK));
    let reloaded: ExecutionState = serde_json::from_slice(&shown.stdout).expect("show json");
    assert_eq!(reloaded, printed);

    let runs = plan_engine(temp.path(), &["runs"]);
    assert_eq!(String::from_utf8_lossy(&runs.stdout).trim(), "cli-1");
}

#[test]
fn unwritable_run_log_still_reports_the_run() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_plan(temp.path(), 2);
    // A directory where the log file belongs makes the log write fail.
    fs::create_dir_all(temp.path().join(".plan-engine/runs/cli-3/log.jsonl")).expect("mkdir");

    let output = plan_engine(temp.path(), &["run", "--plan", "plan.json", "--run-id", "cli-3"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let printed: ExecutionState = serde_json::from_slice(&output.stdout).expect("stdout json");
    assert_eq!(printed.status, RunStatus::Completed);
    assert!(String::from_utf8_lossy(&output.stderr).contains("could not write run log"));
}

#[test]
fn run_stopped_by_budget_exits_with_stopped_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_plan(temp.path(), 4);
    write_config(
        &temp.path().join("plan-engine.toml"),
        &EngineConfig {
            max_iterations: 2,
            ..EngineConfig::default()
        },
    )
    .expect("write config");

    let output = plan_engine(
        temp.path(),
        &["run", "--plan", "plan.json", "--run-id", "cli-2", "--store", "memory"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::STOPPED));
    let printed: ExecutionState = serde_json::from_slice(&output.stdout).expect("stdout json");
    assert_eq!(printed.stop_reason, Some(StopReason::MaxIterations));
    assert!(!temp.path().join(".plan-engine").exists());
}

#[test]
fn invalid_plan_exits_with_invalid_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("plan.json"),
        r#"{ "id": "p", "goal": "g", "steps": [] }"#,
    )
    .expect("write plan");

    let validate = plan_engine(temp.path(), &["validate", "--plan", "plan.json"]);
    assert_eq!(validate.status.code(), Some(exit_codes::INVALID));

    let run = plan_engine(temp.path(), &["run", "--plan", "plan.json"]);
    assert_eq!(run.status.code(), Some(exit_codes::INVALID));
    assert!(!String::from_utf8_lossy(&run.stderr).is_empty());
}

#[test]
fn show_unknown_run_is_an_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = plan_engine(temp.path(), &["show", "--run-id", "missing"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no snapshot for run 'missing'"));
}
