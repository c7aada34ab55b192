//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own temporary data directory.

use std::path::Path;
use std::process::Command;

use serde::Deserialize;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(data_dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_motionrx-cli"))
        .args(args)
        .env("MOTIONRX_DATA_DIR", data_dir)
        .env_remove("MOTIONRX_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_cli_success(data_dir: &Path, args: &[&str]) -> String {
    let (stdout, stderr, code) = run_cli(data_dir, args);
    assert_eq!(code, 0, "CLI command failed: {args:?}\n{stderr}");
    stdout
}

#[derive(Deserialize)]
struct EventOut {
    id: String,
    success: bool,
}

#[derive(Deserialize)]
struct ReportOut {
    summary: SummaryOut,
    target_met: bool,
}

#[derive(Deserialize)]
struct SummaryOut {
    attempts: u32,
    successes: u32,
}

const NECK_EXERCISE: &str = r#"{
  "id": "neck-rotation",
  "symptom": "neck",
  "title": "Neck rotation",
  "description": "Rotate the head slowly",
  "steps": [
    {
      "index": 0,
      "title": "Rotate",
      "description": "Turn left then right",
      "video_url": "https://videos.example/neck-0.mp4",
      "avatar_style": "avatar:calm",
      "thresholds": [
        {"metric": "neck_rotation_left", "comparator": ">=", "value": 60.0, "unit": "deg", "coaching_prompt": "Turn further left"},
        {"metric": "neck_rotation_right", "value": 60.0, "unit": "deg", "coaching_prompt": "Turn further right"}
      ]
    }
  ]
}"#;

fn seed(dir: &Path) {
    let file = dir.join("neck.json");
    std::fs::write(&file, NECK_EXERCISE).unwrap();
    let file = file.to_str().unwrap();

    run_cli_success(dir, &["exercise", "add", "--file", file]);
    run_cli_success(
        dir,
        &["patient", "add", "p1", "--name", "Park", "--birthdate", "1979-06-15"],
    );
    run_cli_success(
        dir,
        &["prescription", "create", "p1", "neck-rotation", "--target", "2", "--id", "rx-1"],
    );
}

#[test]
fn test_attempt_submit_and_adherence() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());

    let out = run_cli_success(
        dir.path(),
        &[
            "attempt", "submit", "rx-1",
            "--sample", "neck_rotation_left=48.2:deg",
            "--sample", "neck_rotation_right=65:deg",
        ],
    );
    let failed: EventOut = serde_json::from_str(&out).unwrap();
    assert!(!failed.success);

    let out = run_cli_success(
        dir.path(),
        &[
            "attempt", "submit", "rx-1",
            "--sample", "neck_rotation_left=61:deg",
            "--sample", "neck_rotation_right=65:deg",
        ],
    );
    let passed: EventOut = serde_json::from_str(&out).unwrap();
    assert!(passed.success);

    let out = run_cli_success(dir.path(), &["progress", "adherence", "p1", "neck-rotation"]);
    let report: ReportOut = serde_json::from_str(&out).unwrap();
    assert_eq!(report.summary.attempts, 2);
    assert_eq!(report.summary.successes, 1);
    assert!(!report.target_met);
}

#[test]
fn test_attempt_retry_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());

    let args = [
        "attempt", "submit", "rx-1",
        "--attempt-id", "a-1",
        "--sample", "neck_rotation_left=70:deg",
    ];
    let first: EventOut = serde_json::from_str(&run_cli_success(dir.path(), &args)).unwrap();
    let retry: EventOut = serde_json::from_str(&run_cli_success(dir.path(), &args)).unwrap();
    assert_eq!(first.id, retry.id);

    let out = run_cli_success(dir.path(), &["progress", "list", "p1"]);
    let events: Vec<EventOut> = serde_json::from_str(&out).unwrap();
    assert_eq!(events.len(), 1);
}

#[test]
fn test_invalid_sample_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());

    let (_, stderr, code) = run_cli(
        dir.path(),
        &["attempt", "submit", "rx-1", "--sample", "neck_rotation_left=NaN:deg"],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));

    let (_, _, code) = run_cli(
        dir.path(),
        &["attempt", "submit", "rx-1", "--sample", "neck_rotation_left=50:mm"],
    );
    assert_eq!(code, 1);
}

#[test]
fn test_preview_records_nothing() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());

    let out = run_cli_success(
        dir.path(),
        &["attempt", "preview", "neck-rotation", "0", "--sample", "neck_rotation_left=60:deg"],
    );
    let preview: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(preview["success"], true);

    let out = run_cli_success(dir.path(), &["progress", "list", "p1"]);
    let events: Vec<serde_json::Value> = serde_json::from_str(&out).unwrap();
    assert!(events.is_empty());
}

#[test]
fn test_coach_uses_language_override() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    run_cli_success(
        dir.path(),
        &["attempt", "submit", "rx-1", "--sample", "neck_rotation_left=50:deg"],
    );

    let out = run_cli_success(
        dir.path(),
        &["coach", "p1", "neck-rotation", "--language", "ko", "--no-audio"],
    );
    let coaching: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(coaching["request"]["language"], "ko");
    assert_eq!(coaching["request"]["audio"], false);
    assert_eq!(coaching["request"]["patient_state"][0]["metric"], "neck_rotation_left");
    assert!(coaching["feedback"][0]["message"]
        .as_str()
        .unwrap()
        .contains("현재"));
}

#[test]
fn test_exercise_list_and_thresholds() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());

    let out = run_cli_success(dir.path(), &["exercise", "list", "--symptom", "neck"]);
    let list: Vec<serde_json::Value> = serde_json::from_str(&out).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["steps"][0]["avatar_style"], "avatar:calm");

    let out = run_cli_success(dir.path(), &["exercise", "thresholds", "neck-rotation", "0"]);
    let thresholds: Vec<serde_json::Value> = serde_json::from_str(&out).unwrap();
    assert_eq!(thresholds.len(), 2);
    assert_eq!(thresholds[1]["comparator"], "gte");

    let (_, _, code) = run_cli(dir.path(), &["exercise", "thresholds", "neck-rotation", "4"]);
    assert_eq!(code, 1);
}

#[test]
fn test_config_set_and_get() {
    let dir = tempfile::tempdir().unwrap();
    run_cli_success(dir.path(), &["config", "set", "coaching.language", "ko"]);
    let out = run_cli_success(dir.path(), &["config", "get", "coaching.language"]);
    assert_eq!(out.trim(), "ko");

    let (_, _, code) = run_cli(dir.path(), &["config", "set", "coaching.volume", "3"]);
    assert_eq!(code, 1);
}
