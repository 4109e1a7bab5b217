//! Integration tests for `outpost modules`.

#![allow(clippy::expect_used)]

use predicates::prelude::*;
use tempfile::TempDir;

use crate::helpers::{home, outpost};

/// Settings that keep mirror probing local and fast: the only candidate is
/// a closed localhost port, so resolution falls back to direct access
/// after one refused connection.
fn write_offline_settings(home: &TempDir) {
    let settings = serde_json::json!({
        "version": 3,
        "installer": {
            "repo": "OutpostLabsHQ/outpost-agent",
            "release_channel": "latest",
            "data_home": home.path().display().to_string(),
            "instance_tick_seconds": 15,
            "lock_timeout_seconds": 8
        },
        "mirrors": {
            "urls": ["http://127.0.0.1:9"],
            "probe_url": "http://127.0.0.1:9/health",
            "probe_seconds": 1
        }
    });
    std::fs::write(
        home.path().join("settings.json"),
        serde_json::to_string_pretty(&settings).expect("serialize"),
    )
    .expect("write settings");
}

#[test]
fn test_modules_list_includes_builtin_catalog() {
    let home = home();
    write_offline_settings(&home);
    outpost(&home)
        .args(["modules", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("agent-bundle"))
        .stdout(predicate::str::contains("adapter-example"));
}

#[cfg(unix)]
#[test]
fn test_modules_install_builtin_example_succeeds() {
    let home = home();
    write_offline_settings(&home);
    outpost(&home)
        .args(["--yes", "modules", "install", "adapter-example"])
        .assert()
        .success()
        .stdout(predicate::str::contains("adapter-example"));
}

#[test]
fn test_modules_install_unknown_module_fails_after_all_providers() {
    let home = home();
    write_offline_settings(&home);
    outpost(&home)
        .args(["--yes", "modules", "install", "no-such-module"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}
