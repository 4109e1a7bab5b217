//! OS process supervision: liveness probe and graceful-then-forced stop.
//!
//! One public surface with two backends selected at build time: signal-based
//! on Unix, process-list based on Windows. Both treat a process that
//! disappears between the liveness check and the signal call as already
//! stopped, not as an error.

use std::time::Duration;

use anyhow::Result;

/// Cadence of the liveness poll inside [`stop`].
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(150);

/// Returns `true` when `pid` refers to a live process.
///
/// Non-positive PIDs are never alive.
#[must_use]
pub fn is_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    backend::is_alive(pid)
}

/// Request graceful termination of `pid`, escalating to a forced kill when
/// the process is still alive after `grace`.
///
/// A no-op for non-positive or already-dead PIDs.
///
/// # Errors
///
/// Returns an error for signaling failures other than "process already
/// gone".
pub fn stop(pid: i32, grace: Duration) -> Result<()> {
    if pid <= 0 || !is_alive(pid) {
        return Ok(());
    }

    backend::terminate(pid)?;

    let deadline = std::time::Instant::now() + grace;
    while std::time::Instant::now() < deadline {
        if !is_alive(pid) {
            return Ok(());
        }
        std::thread::sleep(STOP_POLL_INTERVAL);
    }

    backend::force_kill(pid)
}

#[cfg(unix)]
mod backend {
    use anyhow::{Context, Result};
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    pub fn is_alive(pid: i32) -> bool {
        // Signal 0 probes existence without side effects. EPERM means the
        // process exists but belongs to another user.
        match kill(Pid::from_raw(pid), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    pub fn terminate(pid: i32) -> Result<()> {
        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed SIGTERM pid {pid}")),
        }
    }

    pub fn force_kill(pid: i32) -> Result<()> {
        match kill(Pid::from_raw(pid), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed SIGKILL pid {pid}")),
        }
    }
}

#[cfg(windows)]
mod backend {
    use anyhow::{Context, Result};
    use std::process::Command;

    pub fn is_alive(pid: i32) -> bool {
        let Ok(output) = Command::new("tasklist")
            .args(["/FI", &format!("PID eq {pid}"), "/NH", "/FO", "CSV"])
            .output()
        else {
            return false;
        };
        String::from_utf8_lossy(&output.stdout).contains(&format!("\"{pid}\""))
    }

    pub fn terminate(pid: i32) -> Result<()> {
        // No graceful signal on Windows; taskkill without /F asks politely.
        let output = Command::new("taskkill")
            .args(["/PID", &pid.to_string()])
            .output()
            .with_context(|| format!("failed to run taskkill for pid {pid}"))?;
        if output.status.success() || !is_alive(pid) {
            return Ok(());
        }
        // Leave escalation to kill() after the grace period.
        Ok(())
    }

    pub fn force_kill(pid: i32) -> Result<()> {
        if !is_alive(pid) {
            return Ok(());
        }
        let output = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/F"])
            .output()
            .with_context(|| format!("failed to run taskkill /F for pid {pid}"))?;
        if output.status.success() || !is_alive(pid) {
            Ok(())
        } else {
            anyhow::bail!(
                "failed to kill pid {pid}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )
        }
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
