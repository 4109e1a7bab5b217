//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` — never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::collections::HashMap;
use std::path::Path;
use std::process::Output;
use std::time::Duration;

use anyhow::Result;

// ── Reporting port ────────────────────────────────────────────────────────────

/// Leveled reporting scoped per subsystem. Sync trait — no async needed.
///
/// Services log through an injected `&dyn Reporter`; callers that want no
/// output pass [`NullReporter`], so a missing logger can never crash the core.
pub trait Reporter {
    /// Emit an informational message.
    fn info(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
    /// Emit an error message.
    fn error(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
}

/// Reporter that drops everything.
pub struct NullReporter;

impl Reporter for NullReporter {
    fn info(&self, _: &str) {}
    fn warn(&self, _: &str) {}
    fn error(&self, _: &str) {}
    fn success(&self, _: &str) {}
}

// ── Command runner port ───────────────────────────────────────────────────────

/// Abstracts external process execution so infrastructure can be swapped or
/// mocked. Production runs through tokio with a guaranteed timeout-and-kill;
/// test doubles return canned results without spawning processes.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program, capture its output, and kill it if `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds
    /// `timeout`. On timeout, the child process must be killed (not left
    /// orphaned).
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        workdir: Option<&Path>,
        timeout: Duration,
    ) -> Result<Output>;
}

// ── Step executor port ────────────────────────────────────────────────────────

/// Execution options for one module install step.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Require interactive confirmation before running.
    pub sensitive: bool,
    /// Escalate through `sudo` when not already root.
    pub require_sudo: bool,
    /// Confirmation prompt text for sensitive steps.
    pub prompt: String,
    /// Extra environment injected into the step.
    pub env: HashMap<String, String>,
}

/// Runs one opaque install step with confirmation and sudo escalation.
///
/// The production implementation inherits the terminal; tests inject
/// scripted executors to drive the retry loop deterministically.
#[allow(async_fn_in_trait)]
pub trait StepExecutor {
    /// Run `command args...` under `opts`.
    ///
    /// # Errors
    ///
    /// Returns an error when confirmation is declined, escalation fails, or
    /// the command exits non-zero.
    async fn run(&self, command: &str, args: &[String], opts: &ExecOptions) -> Result<()>;
}

// ── Worker spawner port ───────────────────────────────────────────────────────

/// Spawns the detached instance worker process.
///
/// The production implementation re-invokes the current executable with the
/// hidden worker subcommand, redirecting stdout/stderr into the instance
/// log and releasing the child handle immediately (no parent-child lifetime
/// coupling). Tests inject spawners that start a harmless placeholder.
pub trait WorkerSpawner {
    /// Spawn the worker for an instance and return its PID.
    ///
    /// # Errors
    ///
    /// Returns an error when the log file cannot be opened or the process
    /// cannot be spawned.
    fn spawn(&self, id: &str, display_name: &str, dir: &Path, log_path: &Path) -> Result<i32>;
}

// ── Release fetcher port ──────────────────────────────────────────────────────

/// Fetches release artifacts (manifest, binary, detached signature) over
/// HTTP. Blocking with a bounded per-request timeout; abstracted so the
/// self-update service can be tested without a network.
pub trait ReleaseFetcher {
    /// GET `url` and return the body.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-2xx status.
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}
