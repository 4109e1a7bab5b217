//! Detached instance worker spawning.

use std::fs::OpenOptions;
use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};

use crate::application::ports::WorkerSpawner;

/// Environment variable carrying the instance directory into the worker.
pub const INSTANCE_DIR_ENV: &str = "OUTPOST_INSTANCE_DIR";

/// Hidden subcommand the worker process is started with.
pub const WORKER_SUBCOMMAND: &str = "_worker";

/// Spawns the current executable as a detached worker.
pub struct DetachedWorkerSpawner;

impl WorkerSpawner for DetachedWorkerSpawner {
    fn spawn(&self, id: &str, display_name: &str, dir: &Path, log_path: &Path) -> Result<i32> {
        let exe = std::env::current_exe().context("resolving current executable")?;
        let log = OpenOptions::new()
            .append(true)
            .create(true)
            .open(log_path)
            .with_context(|| format!("opening instance log {}", log_path.display()))?;
        let log_err = log
            .try_clone()
            .with_context(|| format!("cloning log handle {}", log_path.display()))?;

        // std::process drops the handle without killing the child, which is
        // exactly the detachment we want: the worker outlives this command.
        let child = std::process::Command::new(exe)
            .arg(WORKER_SUBCOMMAND)
            .arg(id)
            .arg(display_name)
            .current_dir(dir)
            .env(INSTANCE_DIR_ENV, dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .context("spawning instance worker")?;

        #[allow(clippy::cast_possible_wrap)]
        let pid = child.id() as i32;
        Ok(pid)
    }
}
