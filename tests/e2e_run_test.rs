//! End-to-end tests for the `stagehand` binary.

mod common;

use common::stagehand_cmd;
use predicates::prelude::*;
use stagehand::test_utils::{TestDir, make_passing_plan_toml, make_test_plan_toml};
use stagehand::{assert_contains, assert_json_valid, assert_no_ansi_codes};

fn setups_of(report: &serde_json::Value, subject: &str) -> usize {
    report["trace"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["action"] == "setup" && e["subject"] == subject)
        .count()
}

fn json_report(dir: &TestDir, plan: &str, extra: &[&str]) -> serde_json::Value {
    let path = dir.create_file("plan.toml", plan);
    let output = stagehand_cmd()
        .arg("run")
        .arg(&path)
        .arg("--json")
        .args(extra)
        .output()
        .unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_json_valid!(&stdout);
    serde_json::from_str(&stdout).unwrap()
}

// =============================================================================
// run
// =============================================================================

#[test]
fn passing_plan_exits_zero() {
    let dir = TestDir::new();
    let plan = dir.create_file("plan.toml", &make_passing_plan_toml());

    stagehand_cmd()
        .arg("run")
        .arg(&plan)
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan green"))
        .stdout(predicate::str::contains("OK 2 run, 0 failed, 0 errors"));
}

#[test]
fn failing_case_exits_one_and_names_the_case() {
    let dir = TestDir::new();
    let plan = dir.create_file("plan.toml", &make_test_plan_toml());

    let output = stagehand_cmd().arg("run").arg(&plan).assert().code(1);
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();

    assert_contains!(&stdout, "FAILED 3 run, 1 failed, 0 errors");
    assert_contains!(&stdout, "writes");
    assert_no_ansi_codes!(&stdout);
}

#[test]
fn json_report_shows_shared_fixtures_set_up_once() {
    let dir = TestDir::new();
    let report = json_report(&dir, &make_test_plan_toml(), &[]);

    assert_eq!(report["schema_version"], "stagehand.v1");
    assert_eq!(report["plan"], "sample");
    assert_eq!(report["tests_run"], 3);
    assert_eq!(report["successful"], false);
    assert_eq!(report["failures"][0]["test"], "writes");
    assert_eq!(setups_of(&report, "config"), 1);
    assert_eq!(setups_of(&report, "tables"), 1);
    assert!(report.get("still_active").is_none());
}

#[test]
fn no_merge_sets_up_per_group() {
    let dir = TestDir::new();
    let report = json_report(&dir, &make_test_plan_toml(), &["--no-merge"]);

    assert_eq!(setups_of(&report, "config"), 2);
    assert_eq!(setups_of(&report, "tables"), 2);
}

#[test]
fn merge_env_var_is_honoured() {
    let dir = TestDir::new();
    let plan = dir.create_file("plan.toml", &make_test_plan_toml());

    let output = stagehand_cmd()
        .env("STAGEHAND_MERGE", "false")
        .args(["run", "--json"])
        .arg(&plan)
        .output()
        .unwrap();
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

    assert_eq!(setups_of(&report, "config"), 2);
}

#[test]
fn lifecycle_flag_adds_start_and_end_events() {
    let dir = TestDir::new();
    let report = json_report(&dir, &make_passing_plan_toml(), &["--lifecycle"]);

    let starts = report["trace"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["action"] == "test_start")
        .count();
    assert_eq!(starts, 2);
}

#[test]
fn no_trace_omits_events() {
    let dir = TestDir::new();
    let report = json_report(&dir, &make_passing_plan_toml(), &["--no-trace"]);

    assert_eq!(report["trace"].as_array().unwrap().len(), 0);
    assert_eq!(report["successful"], true);
}

#[test]
fn failing_fixture_setup_reports_one_error() {
    let dir = TestDir::new();
    let report = json_report(
        &dir,
        r#"[[fixtures]]
id = "db"
fail_setup = true

[[tests]]
name = "T"
fixtures = ["db"]
cases = ["a", "b"]
"#,
        &[],
    );

    assert_eq!(report["tests_run"], 0);
    assert_eq!(report["errors"].as_array().unwrap().len(), 1);
    assert_eq!(report["errors"][0]["phase"], "setup");
    assert_eq!(report["errors"][0]["code"], "STG-S001");
}

// =============================================================================
// errors
// =============================================================================

#[test]
fn invalid_plan_exits_two() {
    let dir = TestDir::new();
    let plan = dir.create_file(
        "plan.toml",
        r#"[[tests]]
name = "A"
fixtures = ["ghost"]
cases = ["a"]
"#,
    );

    stagehand_cmd()
        .arg("run")
        .arg(&plan)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("STG-C003"))
        .stderr(predicate::str::contains("ghost"))
        .stderr(predicate::str::contains("stagehand check"));
}

#[test]
fn missing_plan_exits_two() {
    stagehand_cmd()
        .args(["run", "/nonexistent/plan.toml"])
        .assert()
        .code(2);
}

#[test]
fn json_errors_are_structured() {
    let dir = TestDir::new();
    let plan = dir.create_file("plan.toml", "[run]\nname = \"empty\"\n");

    let output = stagehand_cmd()
        .args(["--json", "check"])
        .arg(&plan)
        .assert()
        .code(2);
    let stderr = String::from_utf8(output.get_output().stderr.clone()).unwrap();
    let line = stderr
        .lines()
        .find(|l| l.starts_with('{'))
        .expect("a JSON error line");
    let error: serde_json::Value = serde_json::from_str(line).unwrap();

    assert_eq!(error["error_code"], "STG-C003");
    assert_eq!(error["exit_code"], 2);
}

// =============================================================================
// check and config
// =============================================================================

#[test]
fn check_prints_the_merged_tree() {
    let dir = TestDir::new();
    let plan = dir.create_file("plan.toml", &make_test_plan_toml());

    let output = stagehand_cmd().arg("check").arg(&plan).assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();

    assert_contains!(&stdout, "(3 cases)");
    assert_contains!(&stdout, "- reads");
    assert_contains!(&stdout, "- writes");
    assert_eq!(stdout.matches("config").count(), 1);
}

#[test]
fn check_json_tree_is_valid() {
    let dir = TestDir::new();
    let plan = dir.create_file("plan.toml", &make_passing_plan_toml());

    let output = stagehand_cmd()
        .args(["check", "--json"])
        .arg(&plan)
        .assert()
        .success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let tree: serde_json::Value = serde_json::from_str(&stdout).unwrap();

    assert_eq!(tree["command"], "check");
    assert_eq!(tree["tree"]["cases"], 2);
}

#[test]
fn config_shows_sources() {
    stagehand_cmd()
        .env("STAGEHAND_MERGE", "0")
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("merge"))
        .stdout(predicate::str::contains("environment variable"))
        .stdout(predicate::str::contains("default"));
}

#[test]
fn no_command_prints_quickstart() {
    stagehand_cmd()
        .assert()
        .success()
        .stdout(predicate::str::contains("QUICK START"));
}
