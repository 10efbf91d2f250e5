use assert_cmd::prelude::*;
use predicates::str::contains;
use std::fs;
use assert_cmd::Command;

#[test]
fn apply_creates_folder_and_file_from_tagged_text() {
    let temp = tempfile::tempdir().unwrap();
    let tags = "[LOG: ok]\n[CREATE_FOLDER: lib/widgets]\n[WRITE_FILE: lib/widgets/foo.txt]\nhello\n[/WRITE_FILE]";
    fs::write(temp.path().join("reply.txt"), tags).unwrap();

    let mut cmd = Command::cargo_bin("ds").unwrap();
    cmd.current_dir(temp.path())
        .env("XDG_CONFIG_HOME", temp.path().join(".config"))
        .args(["apply", "--file", "reply.txt"]);
    cmd.assert()
        .success()
        .stdout(contains("📂 Folder: lib/widgets"))
        .stdout(contains("Saved: lib/widgets/foo.txt"));

    assert!(temp.path().join("lib/widgets").is_dir());
    assert_eq!(
        fs::read_to_string(temp.path().join("lib/widgets/foo.txt")).unwrap(),
        "hello"
    );
}

#[test]
fn apply_runs_folder_pass_before_writes_regardless_of_text_order() {
    let temp = tempfile::tempdir().unwrap();
    let tags = "[WRITE_FILE: a/b/c.txt]\nhi\n[/WRITE_FILE]\n[CREATE_FOLDER: a/b]";
    let mut cmd = Command::cargo_bin("ds").unwrap();
    cmd.current_dir(temp.path())
        .env("XDG_CONFIG_HOME", temp.path().join(".config"))
        .arg("apply").write_stdin(tags);
    cmd.assert().success();
    assert_eq!(fs::read_to_string(temp.path().join("a/b/c.txt")).unwrap(), "hi");
}

#[test]
fn apply_denies_protected_paths_and_changes_nothing() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join(".env"), "SECRET=1").unwrap();
    let tags = "[WRITE_FILE: .env]\nSECRET=evil\n[/WRITE_FILE]\n[REMOVE: .env]";

    let mut cmd = Command::cargo_bin("ds").unwrap();
    cmd.current_dir(temp.path())
        .env("XDG_CONFIG_HOME", temp.path().join(".config"))
        .arg("apply").write_stdin(tags);
    cmd.assert()
        .success()
        .stdout(contains("🛡️ Protected: .env (denied)"));

    assert_eq!(fs::read_to_string(temp.path().join(".env")).unwrap(), "SECRET=1");
}

#[test]
fn apply_skips_missing_removals_and_rename_sources_silently() {
    let temp = tempfile::tempdir().unwrap();
    let tags = "[REMOVE: ghost.txt]\n[RENAME: also_ghost.txt -> real.txt]";
    let mut cmd = Command::cargo_bin("ds").unwrap();
    cmd.current_dir(temp.path())
        .env("XDG_CONFIG_HOME", temp.path().join(".config"))
        .arg("apply").write_stdin(tags);
    cmd.assert().success().stdout(predicates::str::is_empty());
    assert!(!temp.path().join("real.txt").exists());
}

#[test]
fn apply_renames_and_removes_real_targets() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join("old.txt"), "body").unwrap();
    fs::create_dir_all(temp.path().join("junk/sub")).unwrap();
    fs::write(temp.path().join("junk/sub/x.txt"), "x").unwrap();
    let tags = "[RENAME: old.txt -> new.txt]\n[REMOVE: junk]";

    let mut cmd = Command::cargo_bin("ds").unwrap();
    cmd.current_dir(temp.path())
        .env("XDG_CONFIG_HOME", temp.path().join(".config"))
        .arg("apply").write_stdin(tags);
    cmd.assert()
        .success()
        .stdout(contains("🚚 Moved: old.txt -> new.txt"))
        .stdout(contains("🔥 Removed: junk"));

    assert!(temp.path().join("new.txt").exists());
    assert!(!temp.path().join("old.txt").exists());
    assert!(!temp.path().join("junk").exists());
}

#[test]
fn apply_json_mode_reports_the_action_list() {
    let temp = tempfile::tempdir().unwrap();
    let tags = "[CREATE_FOLDER: lib]";
    let mut cmd = Command::cargo_bin("ds").unwrap();
    cmd.current_dir(temp.path())
        .env("XDG_CONFIG_HOME", temp.path().join(".config"))
        .args(["--json", "apply"]).write_stdin(tags);
    cmd.assert()
        .success()
        .stdout(contains("\"actions\""))
        .stdout(contains("📂 Folder: lib"));
}
