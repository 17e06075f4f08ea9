//! End-to-end tests for the notesync binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn notesync() -> Command {
    Command::cargo_bin("notesync").unwrap()
}

#[test]
fn help_lists_commands() {
    notesync()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("inspect"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("check-config"));
}

#[test]
fn inspect_account_mirror_in_data_dir() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("queue-user_example_com.json"),
        r#"{"schema_version": 3, "operations": [{"type": "fetch_meeting_notes"}]}"#,
    )
    .unwrap();

    notesync()
        .args(["inspect", "--account", "user@example.com", "--data-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Pending: 1 operations"))
        .stdout(predicate::str::contains("fetch_meeting_notes"));
}

#[test]
fn inspect_json_is_parseable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("queue.json");
    std::fs::write(
        &path,
        r#"{"schema_version": 1, "operations": [{"type": "full_sync"}]}"#,
    )
    .unwrap();

    let output = notesync()
        .args(["inspect", "--json", "--file"])
        .arg(&path)
        .output()
        .unwrap();

    assert!(output.status.success());
    let ops: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(ops[0]["type"], "sync");
    assert_eq!(ops[0]["data"]["kind"], "notes");
}

#[test]
fn inspect_requires_a_target() {
    notesync()
        .arg("inspect")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--account or --file"));
}

#[test]
fn migrate_then_inspect_shows_current_schema() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("queue.json");
    std::fs::write(
        &path,
        r#"{"schema_version": 1, "operations": [{"type": "full_sync", "data": {"kind": "secondary_notes"}}]}"#,
    )
    .unwrap();

    notesync()
        .args(["migrate", "--file"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("from v1 to v3"));

    notesync()
        .args(["migrate", "--file"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("already at schema v3"));
}

#[test]
fn check_config_rejects_bad_values() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notesync.toml");
    std::fs::write(&path, "[realtime]\nbackoff_step_ms = 120000\n").unwrap();

    notesync()
        .arg("check-config")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("backoff_step_ms"));
}

#[test]
fn check_config_accepts_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notesync.toml");
    std::fs::write(&path, "").unwrap();

    notesync()
        .arg("check-config")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("OK"));
}
