//! End-to-end tests for the `kv` binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn kv(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("kv").expect("kv binary should build");
    cmd.arg("--dir").arg(dir.path());
    cmd
}

#[test]
fn test_set_then_get() {
    let dir = TempDir::new().unwrap();

    kv(&dir)
        .args(["set", "smarttrack_settings", "{\"units\":\"kg\"}"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Stored"));

    kv(&dir)
        .args(["get", "smarttrack_settings"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"units\":\"kg\""));
}

#[test]
fn test_get_missing_key_fails() {
    let dir = TempDir::new().unwrap();
    kv(&dir)
        .args(["get", "nothing_here"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No value for key"));
}

#[test]
fn test_set_rejects_invalid_json() {
    let dir = TempDir::new().unwrap();
    kv(&dir)
        .args(["set", "k", "{not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not valid JSON"));
}

#[test]
fn test_keys_and_remove() {
    let dir = TempDir::new().unwrap();
    kv(&dir).args(["set", "a", "1"]).assert().success();
    kv(&dir).args(["set", "b", "2"]).assert().success();

    kv(&dir)
        .arg("keys")
        .assert()
        .success()
        .stdout(predicate::str::contains("a\nb"));

    kv(&dir).args(["remove", "a"]).assert().success();
    kv(&dir)
        .arg("keys")
        .assert()
        .success()
        .stdout(predicate::str::contains("a\n").not());
}

#[test]
fn test_size_reports_total() {
    let dir = TempDir::new().unwrap();
    kv(&dir).args(["set", "abc", "[1,2]"]).assert().success();
    kv(&dir)
        .arg("size")
        .assert()
        .success()
        .stdout(predicate::str::contains("8 total"));
}

#[test]
fn test_config_file_quota_applies() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("kvstore.yml");
    std::fs::write(&config, "quota-bytes: 16\n").unwrap();

    let mut cmd = Command::cargo_bin("kv").expect("kv binary should build");
    cmd.arg("--config")
        .arg(&config)
        .arg("--dir")
        .arg(dir.path().join("store"))
        .args(["set", "settings", "{\"units\":\"kg\"}"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Quota exceeded"));
}
