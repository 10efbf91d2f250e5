use assert_cmd::prelude::*;
use predicates::str::contains;
use assert_cmd::Command;

#[test]
fn prints_help() {
    let mut cmd = Command::cargo_bin("ds").unwrap();
    cmd.arg("--help");
    cmd.assert().success().stdout(contains("Chat-driven project assistant"));
}

#[test]
fn ask_requires_prompt() {
    let mut cmd = Command::cargo_bin("ds").unwrap();
    cmd.arg("ask");
    cmd.assert().failure().stderr(contains("Usage:"));
}

#[test]
fn ask_rejects_unknown_mode() {
    let temp = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("ds").unwrap();
    cmd.current_dir(temp.path())
        .env("XDG_CONFIG_HOME", temp.path().join(".config"))
        .env("DS_MOCK_REPLY", "hi")
        .args(["ask", "--mode", "telepathy", "hello"]);
    cmd.assert().failure().stderr(contains("unknown mode"));
}

#[test]
fn apply_with_empty_stdin_produces_no_actions() {
    let temp = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("ds").unwrap();
    cmd.current_dir(temp.path())
        .env("XDG_CONFIG_HOME", temp.path().join(".config"))
        .arg("apply").write_stdin("");
    cmd.assert().success().stdout(predicates::str::is_empty());
}

#[test]
fn check_passes_non_dart_files() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::write(temp.path().join("note.txt"), "hello").unwrap();
    let mut cmd = Command::cargo_bin("ds").unwrap();
    cmd.current_dir(temp.path())
        .env("XDG_CONFIG_HOME", temp.path().join(".config"))
        .args(["check", "note.txt"]);
    cmd.assert().success().stdout(contains("not a Dart file"));
}
