//! CLI tests for the `slowfs` binary that do not need a live mount.

#![allow(deprecated)] // cargo_bin! macro doesn't exist yet in assert_cmd 2.1

use assert_cmd::Command;
use predicates::prelude::*;

fn slowfs() -> Command {
    Command::cargo_bin("slowfs").unwrap()
}

#[test]
fn test_help_lists_options() {
    slowfs()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--delay"))
        .stdout(predicate::str::contains("SLOWFS_DELAY"))
        .stdout(predicate::str::contains("MOUNTPOINT"));
}

#[test]
fn test_version() {
    slowfs()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("slowfs"));
}

#[test]
fn test_invalid_delay_is_usage_error() {
    slowfs()
        .args(["--delay", "soon", "/tmp"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--delay"));
}

#[test]
fn test_invalid_delay_from_env_is_usage_error() {
    slowfs()
        .env("SLOWFS_DELAY", "not-a-duration")
        .arg("/tmp")
        .assert()
        .code(2);
}

#[test]
fn test_missing_mountpoint_is_mount_failure() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");

    slowfs()
        .arg(&missing)
        .assert()
        .code(6)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("not a directory"));
}

#[test]
fn test_extra_positional_is_usage_error() {
    slowfs().args(["/tmp/a", "/tmp/b"]).assert().code(2);
}
