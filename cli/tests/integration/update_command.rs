//! Integration tests for `outpost update` (instance update round trip) and
//! transition enforcement across processes.

#![allow(clippy::expect_used)]

use predicates::prelude::*;

use crate::helpers::{home, outpost, read_config};

#[test]
fn test_update_round_trips_back_to_installed() {
    let home = home();
    outpost(&home).args(["install", "demo"]).assert().success();

    outpost(&home).args(["update", "demo"]).assert().success();
    let config = read_config(&home, "demo");
    assert_eq!(config["status"], "installed");
}

#[test]
fn test_update_without_install_fails_with_hint() {
    let home = home();
    outpost(&home)
        .args(["update", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not installed"));
}

#[cfg(unix)]
#[test]
fn test_install_over_running_instance_is_invalid_transition() {
    let home = home();
    outpost(&home).args(["install", "demo"]).assert().success();
    outpost(&home).args(["start", "demo"]).assert().success();

    outpost(&home)
        .args(["install", "demo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid state transition"));

    outpost(&home).args(["stop", "demo"]).assert().success();
}

#[cfg(unix)]
#[test]
fn test_update_while_running_returns_to_installed() {
    // running → updating → installed is legal; the worker keeps running and
    // the record ends at installed (only updating may return there).
    let home = home();
    outpost(&home).args(["install", "demo"]).assert().success();
    outpost(&home).args(["start", "demo"]).assert().success();

    outpost(&home).args(["update", "demo"]).assert().success();
    let config = read_config(&home, "demo");
    assert_eq!(config["status"], "installed");

    outpost(&home).args(["stop", "demo"]).assert().success();
}
