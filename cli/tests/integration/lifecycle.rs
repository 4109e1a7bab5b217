//! End-to-end lifecycle tests: install → start → stop → delete.

#![allow(clippy::expect_used)]

use predicates::prelude::*;

use crate::helpers::{assert_exists, home, index_path, outpost, read_config};

#[test]
fn test_install_creates_config_registry_and_log() {
    let home = home();
    outpost(&home)
        .args(["install", "demo"])
        .assert()
        .success();

    let config = read_config(&home, "demo");
    assert_eq!(config["status"], "installed");
    assert_eq!(config["pid"], 0);
    assert_eq!(config["display_name"], "demo");

    assert_exists(&index_path(&home));
    let id = outpost_cli::domain::instance::instance_id("demo");
    assert_exists(
        &home
            .path()
            .join("instances")
            .join(&id)
            .join("instance.log"),
    );
}

#[cfg(unix)]
#[test]
fn test_install_start_stop_roundtrip() {
    let home = home();
    outpost(&home).args(["install", "demo"]).assert().success();

    outpost(&home).args(["start", "demo"]).assert().success();
    let config = read_config(&home, "demo");
    assert_eq!(config["status"], "running");
    let pid = config["pid"].as_i64().expect("pid must be a number");
    assert!(pid > 0, "running instance must record its worker pid");
    assert!(
        crate::helpers::pid_is_alive(pid),
        "worker pid {pid} must be alive after start"
    );

    outpost(&home).args(["stop", "demo"]).assert().success();
    let config = read_config(&home, "demo");
    assert_eq!(config["status"], "stopped");
    assert_eq!(config["pid"], 0);
}

#[test]
fn test_start_without_install_fails_with_hint() {
    let home = home();
    outpost(&home)
        .args(["start", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not installed"))
        .stderr(predicate::str::contains("outpost install"));
}

#[test]
fn test_status_reports_key_value_lines() {
    let home = home();
    outpost(&home).args(["install", "demo"]).assert().success();

    outpost(&home)
        .args(["status", "demo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("name=demo"))
        .stdout(predicate::str::contains("state=installed"))
        .stdout(predicate::str::contains("pid=0"));
}

#[test]
fn test_status_resolves_instance_by_id() {
    let home = home();
    outpost(&home).args(["install", "demo"]).assert().success();

    let id = outpost_cli::domain::instance::instance_id("demo");
    outpost(&home)
        .args(["status", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("name=demo"));
}

#[test]
fn test_list_shows_installed_instances_sorted() {
    let home = home();
    outpost(&home).args(["install", "bravo"]).assert().success();
    outpost(&home).args(["install", "alpha"]).assert().success();

    let assert = outpost(&home).arg("list").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let alpha = stdout.find("alpha").expect("alpha listed");
    let bravo = stdout.find("bravo").expect("bravo listed");
    assert!(alpha < bravo, "listing must be sorted by display name");
}

#[test]
fn test_logs_default_tail() {
    let home = home();
    outpost(&home).args(["install", "demo"]).assert().success();

    let id = outpost_cli::domain::instance::instance_id("demo");
    let log_path = home
        .path()
        .join("instances")
        .join(&id)
        .join("instance.log");
    let content: String = (1..=60).map(|i| format!("line {i}\n")).collect();
    std::fs::write(&log_path, content).expect("write log");

    outpost(&home)
        .args(["logs", "demo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("line 60"))
        .stdout(predicate::str::contains("line 11"))
        .stdout(predicate::str::contains("line 10").not());
}

#[test]
fn test_delete_removes_instance_and_registry_entry() {
    let home = home();
    outpost(&home).args(["install", "demo"]).assert().success();

    outpost(&home)
        .args(["--yes", "delete", "demo"])
        .assert()
        .success();

    let id = outpost_cli::domain::instance::instance_id("demo");
    assert!(!home.path().join("instances").join(&id).exists());
    outpost(&home)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("no instances"));
}

#[test]
fn test_version_prints_crate_version() {
    let home = home();
    outpost(&home)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
