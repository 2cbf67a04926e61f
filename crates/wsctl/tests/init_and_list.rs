use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::TempDir;

#[test]
#[serial]
fn init_creates_workspace_file_in_cwd() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("wsctl")
        .unwrap()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));
    assert!(dir.path().join(".workspace.yml").exists());
}

#[test]
#[serial]
fn init_refuses_to_overwrite_without_force() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("wsctl").unwrap().current_dir(dir.path()).arg("init").assert().success();
    Command::cargo_bin("wsctl")
        .unwrap()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
#[serial]
fn init_force_overwrites_existing_file() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("wsctl").unwrap().current_dir(dir.path()).arg("init").assert().success();
    Command::cargo_bin("wsctl")
        .unwrap()
        .current_dir(dir.path())
        .args(["init", "-f"])
        .assert()
        .success();
}

#[test]
fn list_with_no_workspaces_reports_none_or_succeeds() {
    Command::cargo_bin("wsctl").unwrap().arg("list").assert().success();
}
