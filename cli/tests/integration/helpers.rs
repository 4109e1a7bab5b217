//! Shared helpers for integration tests.

#![allow(clippy::expect_used)]

use std::path::Path;

use assert_cmd::Command;
use tempfile::TempDir;

/// A fresh `outpost` command bound to an isolated data home.
pub fn outpost(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("outpost").expect("outpost binary should exist");
    cmd.env("OUTPOST_HOME", home.path());
    cmd.env_remove("OUTPOST_YES");
    cmd
}

/// Isolated data home for one test.
pub fn home() -> TempDir {
    TempDir::new().expect("tempdir")
}

/// Read and parse an instance's `config.json`.
pub fn read_config(home: &TempDir, name: &str) -> serde_json::Value {
    let id = outpost_cli::domain::instance::instance_id(name);
    let path = home
        .path()
        .join("instances")
        .join(&id)
        .join("config.json");
    let data = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("reading {}: {e}", path.display()));
    serde_json::from_str(&data).expect("config.json must be valid JSON")
}

/// `true` when `pid` is a live process (unix only; tests gate on cfg).
#[cfg(unix)]
pub fn pid_is_alive(pid: i64) -> bool {
    #[allow(clippy::cast_possible_truncation)]
    outpost_cli::infra::process::is_alive(pid as i32)
}

/// Path of the shared registry index.
pub fn index_path(home: &TempDir) -> std::path::PathBuf {
    home.path().join("instances").join("index.json")
}

/// Assert a path exists, with a readable message.
pub fn assert_exists(path: &Path) {
    assert!(path.exists(), "expected {} to exist", path.display());
}
