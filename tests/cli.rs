//! End-to-end checks of the `pulsescope` binary against fixture artifact
//! directories.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, body: Value) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body.to_string()).unwrap();
}

fn result(test: &str, result: &str, time: Option<f64>) -> Value {
    let mut r = json!({
        "project_name": "core",
        "class_name": "WidgetIT",
        "test_name": test,
        "result": result,
    });
    if let Some(t) = time {
        r["time"] = json!(t);
    }
    r
}

/// Two executions, authorship data and no commit deltas.
fn fixture() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write(
        root,
        "test_results/test_results_index.json",
        json!([
            {"filename": "run1.json", "execution_time": "2024-11-05 15:07:00", "test_branch": "main",
             "counts": {"passed": 2, "failed": 0, "error": 0, "skipped": 0}},
            {"filename": "run2.json", "execution_time": "2024-11-06 09:30:00", "test_branch": "main",
             "counts": {"passed": 1, "failed": 2, "error": 0, "skipped": 0}}
        ]),
    );
    write(
        root,
        "test_results/run1.json",
        json!({
            "execution_time": "2024-11-05 15:07:00",
            "test_branch": "main",
            "test_results": [result("a", "passed", Some(1.0)), result("b", "passed", Some(2.0))]
        }),
    );
    write(
        root,
        "test_results/run2.json",
        json!({
            "execution_time": "2024-11-06 09:30:00",
            "execution_duration": "12m 3s",
            "test_branch": "main",
            "test_results": [
                result("a", "passed", Some(400.0)),
                result("b", "failed", Some(30.0)),
                result("c", "failed", None)
            ]
        }),
    );
    write(
        root,
        "test_analysis_results.json",
        json!({
            "test_metadata": [
                {"author": "Ada", "project": "core", "package": "com/acme", "class": "WidgetIT",
                 "test": "t1", "test_type": "integration", "timestamp": "2024-02-10"},
                {"author": "Bob", "project": "core", "package": "com/acme", "class": "WidgetTest",
                 "test": "t2", "test_type": "unit", "timestamp": "2024-03-12"}
            ],
            "monthly_aggregates": [{"month": "2024-01"}, {"month": "2024-02"}, {"month": "2024-03"}],
            "author_test_count": {"Ada": 1, "Bob": 1}
        }),
    );
    dir
}

fn pulsescope(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pulsescope").unwrap();
    for var in [
        "PULSESCOPE_SOURCE",
        "PULSESCOPE_EXECUTION",
        "PULSESCOPE_COMPARED",
        "PULSESCOPE_MOBILE",
        "PULSESCOPE_FORMAT",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd.arg("--source").arg(dir.path());
    cmd
}

fn json_output(cmd: &mut Command) -> Value {
    let out = cmd.arg("--format").arg("json").output().unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout).unwrap()
}

#[test]
fn test_cli_help() {
    Command::cargo_bin("pulsescope")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("test-authorship velocity"));
}

#[test]
fn velocity_trims_leading_empty_months() {
    let dir = fixture();
    pulsescope(&dir)
        .arg("velocity")
        .assert()
        .success()
        .stdout(predicate::str::contains("Test velocity"))
        .stdout(predicate::str::contains("Feb 2024"))
        .stdout(predicate::str::contains("Mar 2024"))
        .stdout(predicate::str::contains("Jan 2024").not());
}

#[test]
fn velocity_author_filter() {
    let dir = fixture();
    let v = json_output(pulsescope(&dir).args(["velocity", "--author", "Bob"]));
    let summary = &v["velocity"]["summary"];
    assert_eq!(summary["total_integration"], 0);
    assert_eq!(summary["total_unit"], 1);
    assert_eq!(summary["series"]["labels"], json!(["2024-03"]));
}

#[test]
fn velocity_month_drill_down() {
    let dir = fixture();
    pulsescope(&dir)
        .args(["velocity", "--month", "2024-02", "--type", "integration"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tests added in Feb 2024 (integration)"))
        .stdout(predicate::str::contains("WidgetIT.t1"));

    let v = json_output(pulsescope(&dir).args(["velocity", "--month", "2024-3", "--type", "unit"]));
    let details = &v["velocity"]["details"];
    assert_eq!(details["month"], "2024-03");
    assert_eq!(details["kind"], "unit");
    assert_eq!(details["tests"][0]["test"], "t2");
}

#[test]
fn velocity_month_off_axis_warns() {
    let dir = fixture();
    pulsescope(&dir)
        .args(["velocity", "--month", "2023-07"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tests added in").not())
        .stderr(predicate::str::contains("month is not on the velocity axis"));
}

#[test]
fn velocity_type_requires_month() {
    let dir = fixture();
    pulsescope(&dir)
        .args(["velocity", "--type", "unit"])
        .assert()
        .failure();
}

#[test]
fn delta_defaults_to_latest_two_runs() {
    let dir = fixture();
    let v = json_output(pulsescope(&dir).args(["delta", "--category", "failed"]));
    let run = &v["run"];
    assert_eq!(run["selection"]["execution"], "run2.json");
    assert_eq!(run["selection"]["compared"], "run1.json");

    let entries = run["deltas"][0]["entries"].as_array().unwrap();
    let got: Vec<(&str, &str, &str)> = entries
        .iter()
        .map(|e| {
            (
                e["testName"].as_str().unwrap(),
                e["previousResult"].as_str().unwrap(),
                e["currentResult"].as_str().unwrap(),
            )
        })
        .collect();
    assert_eq!(got, vec![("b", "passed", "failed"), ("c", "Not Present", "failed")]);
}

#[test]
fn unknown_execution_falls_back_to_latest() {
    let dir = fixture();
    pulsescope(&dir)
        .args(["--execution", "nope.json", "results"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Execution run2.json"))
        .stderr(predicate::str::contains("execution not found in index"));
}

#[test]
fn results_lists_failures_with_trend() {
    let dir = fixture();
    pulsescope(&dir)
        .arg("results")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nov 5th, 3:07pm"))
        .stdout(predicate::str::contains("Nov 6th, 9:30am"))
        .stdout(predicate::str::contains("failed   b"))
        .stdout(predicate::str::contains("passed   a").not());
}

#[test]
fn results_unknown_project_warns() {
    let dir = fixture();
    pulsescope(&dir)
        .args(["results", "--project", "mobile"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No failed or errored tests."))
        .stderr(predicate::str::contains("project not in this execution"));
}

#[test]
fn slowest_skips_untimed_results() {
    let dir = fixture();
    let v = json_output(pulsescope(&dir).args(["slowest", "--count", "10"]));
    let tests = v["run"]["slowest"]["tests"].as_array().unwrap();
    let names: Vec<&str> = tests.iter().map(|t| t["test_name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(tests[0]["level"], "error");
}

#[test]
fn slowest_rejects_non_preset_count() {
    let dir = fixture();
    pulsescope(&dir)
        .args(["slowest", "--count", "7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be one of"));
}

#[test]
fn commits_unavailable_without_delta_file() {
    let dir = fixture();
    pulsescope(&dir)
        .arg("commits")
        .assert()
        .success()
        .stdout(predicate::str::contains("Commit data not available"));
}

#[test]
fn commits_empty_entry_means_no_new_commits() {
    let dir = fixture();
    write(
        dir.path(),
        "commit_deltas.json",
        json!([{"from_filename": "run1.json", "to_filename": "run2.json",
                "glide_commits": [], "glide_test_commits": []}]),
    );
    pulsescope(&dir)
        .arg("commits")
        .assert()
        .success()
        .stdout(predicate::str::contains("No new commits"));
}

#[test]
fn metrics_missing_file_is_not_fatal() {
    let dir = fixture();
    pulsescope(&dir)
        .arg("metrics")
        .assert()
        .success()
        .stdout(predicate::str::contains("No project metrics available."));
}

#[test]
fn metrics_unknown_project_warns() {
    let dir = fixture();
    write(
        dir.path(),
        "test_project_metrics.json",
        json!([{"project_name": "core", "total_classes": 2, "total_cases": 4,
                "total_ignored": 1, "ignored_percentage": 25.0, "ignored_tests": []}]),
    );
    pulsescope(&dir)
        .args(["metrics", "--project", "web"])
        .assert()
        .success()
        .stderr(predicate::str::contains("project has no metrics"));
}

#[test]
fn report_renders_markdown() {
    let dir = fixture();
    pulsescope(&dir)
        .args(["--format", "markdown", "report"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("## pulsescope"))
        .stdout(predicate::str::contains("### Test velocity"))
        .stdout(predicate::str::contains("### Execution `run2.json`"))
        .stdout(predicate::str::contains("### Project metrics"));
}

#[test]
fn missing_source_directory_fails() {
    let dir = fixture();
    Command::cargo_bin("pulsescope")
        .unwrap()
        .env_remove("PULSESCOPE_SOURCE")
        .arg("--source")
        .arg(dir.path().join("missing"))
        .arg("results")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}
