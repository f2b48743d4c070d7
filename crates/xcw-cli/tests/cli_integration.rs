//! End-to-end tests of the compiled binary against a stub `xcrun`
//! installed on PATH, mirroring how agents actually invoke the tool.

#![cfg(unix)]

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use xcw_testing::{device_list_json, install_stub_xcrun, raw_line};

const BUNDLE: &str = "com.ex";

fn xcw(stub_dir: &Path, state_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("xcw").unwrap();
    let path = format!(
        "{}:{}",
        stub_dir.display(),
        std::env::var("PATH").unwrap_or_default()
    );
    cmd.env("PATH", path)
        .env("XCW_PATH", state_dir)
        .env("HOME", state_dir);
    cmd
}

fn stub_with_lines(lines: &[String]) -> (TempDir, TempDir) {
    let stub_dir = TempDir::new().unwrap();
    let state_dir = TempDir::new().unwrap();
    install_stub_xcrun(
        stub_dir.path(),
        &device_list_json("iPhone 17 Pro", "UDID-TEST"),
        lines,
    )
    .unwrap();
    (stub_dir, state_dir)
}

fn ndjson_events(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

#[test]
fn tail_streams_until_max_logs_cutoff() {
    let lines = vec![
        raw_line(111, "Info", BUNDLE, "first"),
        raw_line(111, "Info", BUNDLE, "second"),
        raw_line(111, "Info", BUNDLE, "third"),
    ];
    let (stub_dir, state_dir) = stub_with_lines(&lines);

    let output = xcw(stub_dir.path(), state_dir.path())
        .args([
            "tail",
            "-a",
            BUNDLE,
            "-s",
            "iPhone 17 Pro",
            "--level",
            "debug",
            "--max-logs",
            "2",
        ])
        .timeout(std::time::Duration::from_secs(20))
        .output()
        .unwrap();

    assert!(output.status.success(), "exit: {:?}", output.status);

    let events = ndjson_events(&output.stdout);
    let types: Vec<&str> = events.iter().filter_map(|e| e["type"].as_str()).collect();

    assert_eq!(types[0], "ready");
    assert!(types.contains(&"agent_hints"));
    assert!(types.contains(&"session_start"));
    assert_eq!(types.iter().filter(|t| **t == "log").count(), 2);

    let cutoff = events.iter().find(|e| e["type"] == "cutoff_reached").unwrap();
    assert_eq!(cutoff["reason"], "max_logs");
    assert_eq!(cutoff["count"], 2);
}

#[test]
fn tail_with_invalid_pattern_exits_one_with_error_event() {
    let (stub_dir, state_dir) = stub_with_lines(&[]);

    let output = xcw(stub_dir.path(), state_dir.path())
        .args(["tail", "-a", BUNDLE, "-p", "[unclosed"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let events = ndjson_events(&output.stdout);
    let error = events.iter().find(|e| e["type"] == "error").unwrap();
    assert_eq!(error["code"], "INVALID_PATTERN");
}

#[test]
fn quiet_with_text_format_is_an_invalid_flag_combo() {
    let (stub_dir, state_dir) = stub_with_lines(&[]);

    xcw(stub_dir.path(), state_dir.path())
        .args(["tail", "-a", BUNDLE, "--format", "text", "--quiet"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("INVALID_FLAGS"));
}

#[test]
fn unknown_device_exits_one_with_device_not_found() {
    let (stub_dir, state_dir) = stub_with_lines(&[]);

    let output = xcw(stub_dir.path(), state_dir.path())
        .args(["tail", "-a", BUNDLE, "-s", "iPhone 3G"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let events = ndjson_events(&output.stdout);
    let error = events.iter().find(|e| e["type"] == "error").unwrap();
    assert_eq!(error["code"], "DEVICE_NOT_FOUND");
    assert!(error["hint"].as_str().is_some());
}

#[test]
fn watch_without_triggers_is_an_invalid_flag_combo() {
    let (stub_dir, state_dir) = stub_with_lines(&[]);

    let output = xcw(stub_dir.path(), state_dir.path())
        .args(["watch", "-a", BUNDLE])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let events = ndjson_events(&output.stdout);
    let error = events.iter().find(|e| e["type"] == "error").unwrap();
    assert_eq!(error["code"], "INVALID_FLAGS");
}

#[test]
fn watch_rejects_malformed_trigger_pattern() {
    let (stub_dir, state_dir) = stub_with_lines(&[]);

    let output = xcw(stub_dir.path(), state_dir.path())
        .args(["watch", "-a", BUNDLE, "--on-pattern", "[bad:cmd"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let events = ndjson_events(&output.stdout);
    let error = events.iter().find(|e| e["type"] == "error").unwrap();
    assert_eq!(error["code"], "INVALID_TRIGGER_PATTERN");
}

#[test]
fn watch_rejects_pair_without_command() {
    let (stub_dir, state_dir) = stub_with_lines(&[]);

    let output = xcw(stub_dir.path(), state_dir.path())
        .args(["watch", "-a", BUNDLE, "--on-pattern", "no-colon-here"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let events = ndjson_events(&output.stdout);
    assert_eq!(events.iter().find(|e| e["type"] == "error").unwrap()["code"], "INVALID_TRIGGER");
}

#[test]
fn watch_fires_trigger_on_error_log() {
    let lines = vec![
        raw_line(111, "Error", BUNDLE, "boom"),
        raw_line(111, "Info", BUNDLE, "after"),
    ];
    let (stub_dir, state_dir) = stub_with_lines(&lines);

    let output = xcw(stub_dir.path(), state_dir.path())
        .args([
            "watch",
            "-a",
            BUNDLE,
            "--level",
            "debug",
            "--on-error",
            "true",
            "--max-logs",
            "2",
        ])
        .timeout(std::time::Duration::from_secs(20))
        .output()
        .unwrap();

    // The stub replays the same lines after each reconnect, so the third
    // matching entry arrives on the second connection and cuts the tail
    // off cleanly.
    assert!(output.status.success(), "exit: {:?}", output.status);

    let events = ndjson_events(&output.stdout);
    let trigger = events.iter().find(|e| e["type"] == "trigger").unwrap();
    assert_eq!(trigger["trigger_type"], "error");
    assert_eq!(trigger["command"], "true");
}

#[test]
fn replay_filters_and_reports_completion() {
    let (stub_dir, state_dir) = stub_with_lines(&[]);
    let data_dir = TempDir::new().unwrap();
    let file = data_dir.path().join("capture.ndjson");

    let capture = [
        r#"{"type":"log","schemaVersion":1,"tail_id":"t","session":1,"contract_version":1,"timestamp":"2025-12-11T10:00:00Z","level":"Error","process":"App","pid":1,"subsystem":"com.ex","category":"","message":"bad thing"}"#,
        r#"{"type":"log","schemaVersion":1,"tail_id":"t","session":1,"contract_version":1,"timestamp":"2025-12-11T10:00:01Z","level":"Info","process":"App","pid":1,"subsystem":"com.ex","category":"","message":"fine thing"}"#,
        r#"{"type":"heartbeat","schemaVersion":1}"#,
        "not json at all",
    ]
    .join("\n");
    std::fs::write(&file, capture).unwrap();

    let output = xcw(stub_dir.path(), state_dir.path())
        .args([
            "replay",
            "-f",
            file.to_str().unwrap(),
            "--where",
            "level>=error",
        ])
        .output()
        .unwrap();

    assert!(output.status.success());
    let events = ndjson_events(&output.stdout);

    let logs: Vec<_> = events.iter().filter(|e| e["type"] == "log").collect();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["message"], "bad thing");

    let complete = events.iter().find(|e| e["type"] == "replay_complete").unwrap();
    assert_eq!(complete["count"], 1);
}

#[test]
fn analyze_aggregates_patterns_and_persists_when_asked() {
    let (stub_dir, state_dir) = stub_with_lines(&[]);
    let data_dir = TempDir::new().unwrap();
    let file = data_dir.path().join("capture.ndjson");

    let mut lines = Vec::new();
    for i in 0..4 {
        lines.push(format!(
            r#"{{"timestamp":"2025-12-11T10:00:0{i}Z","level":"Error","process":"App","pid":1,"message":"timeout after {i}s"}}"#
        ));
    }
    lines.push(
        r#"{"timestamp":"2025-12-11T10:00:05Z","level":"Info","process":"App","pid":1,"message":"started"}"#.to_string(),
    );
    std::fs::write(&file, lines.join("\n")).unwrap();

    let output = xcw(stub_dir.path(), state_dir.path())
        .args([
            "analyze",
            "-f",
            file.to_str().unwrap(),
            "--persist-patterns",
        ])
        .output()
        .unwrap();

    assert!(output.status.success());
    let events = ndjson_events(&output.stdout);
    let analysis = events.iter().find(|e| e["type"] == "analysis").unwrap();

    assert_eq!(analysis["summary"]["total"], 5);
    assert_eq!(analysis["summary"]["counts"]["error"], 4);

    let patterns = analysis["patterns"].as_array().unwrap();
    let top = &patterns[0];
    assert_eq!(top["pattern"], "timeout after <n>s");
    assert_eq!(top["count"], 4);
    assert_eq!(top["is_new"], true);

    // The learned-pattern store landed in the state dir.
    let store = state_dir.path().join("patterns.json");
    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store).unwrap()).unwrap();
    assert_eq!(stored["version"], 1);

    // A second run sees the pattern as known.
    let output = xcw(stub_dir.path(), state_dir.path())
        .args(["analyze", "-f", file.to_str().unwrap()])
        .output()
        .unwrap();
    let events = ndjson_events(&output.stdout);
    let analysis = events.iter().find(|e| e["type"] == "analysis").unwrap();
    let top = &analysis["patterns"].as_array().unwrap()[0];
    assert_eq!(top["is_new"], false);
    assert_eq!(top["total_count"], 4);

    // --top bounds the emitted list, never the distinct-template count.
    let output = xcw(stub_dir.path(), state_dir.path())
        .args(["analyze", "-f", file.to_str().unwrap(), "--top", "1"])
        .output()
        .unwrap();
    let events = ndjson_events(&output.stdout);
    let analysis = events.iter().find(|e| e["type"] == "analysis").unwrap();
    assert_eq!(analysis["summary"]["unique_patterns"], 2);
    assert_eq!(analysis["patterns"].as_array().unwrap().len(), 1);
}

#[test]
fn replay_of_missing_file_reports_replay_failed() {
    let (stub_dir, state_dir) = stub_with_lines(&[]);

    let output = xcw(stub_dir.path(), state_dir.path())
        .args(["replay", "-f", "/nonexistent/capture.ndjson"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let events = ndjson_events(&output.stdout);
    let error = events.iter().find(|e| e["type"] == "error").unwrap();
    assert_eq!(error["code"], "REPLAY_FAILED");
}

#[test]
fn analyze_of_missing_file_reports_analyze_failed() {
    let (stub_dir, state_dir) = stub_with_lines(&[]);

    let output = xcw(stub_dir.path(), state_dir.path())
        .args(["analyze", "-f", "/nonexistent/capture.ndjson"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let events = ndjson_events(&output.stdout);
    let error = events.iter().find(|e| e["type"] == "error").unwrap();
    assert_eq!(error["code"], "ANALYZE_FAILED");
}

#[test]
fn query_drains_to_eof_and_completes() {
    let lines = vec![
        raw_line(111, "Error", BUNDLE, "historical error"),
        raw_line(111, "Info", BUNDLE, "historical info"),
    ];
    let (stub_dir, state_dir) = stub_with_lines(&lines);

    let output = xcw(stub_dir.path(), state_dir.path())
        .args([
            "query",
            "-a",
            BUNDLE,
            "-s",
            "iPhone 17 Pro",
            "--level",
            "debug",
            "--since",
            "5m",
            "--limit",
            "10",
        ])
        .output()
        .unwrap();

    assert!(output.status.success());
    let events = ndjson_events(&output.stdout);
    assert_eq!(events.iter().filter(|e| e["type"] == "log").count(), 2);
    assert!(events.iter().any(|e| e["type"] == "query_complete"));
}
