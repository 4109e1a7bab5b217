//! Cross-process file lock with staleness reclamation.
//!
//! A lock is a marker file created with `create_new` (exclusive, never
//! overwriting). The PID and creation time written into the marker are
//! diagnostic only; possession is the file's existence. A marker older than
//! [`STALE_AFTER`] is reclaimed by the next acquirer so an abandoned lease
//! from a crashed process cannot block forever.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use anyhow::{Context, Result};

use crate::domain::error::LockError;

/// Age after which a marker left by another process is considered abandoned.
pub const STALE_AFTER: Duration = Duration::from_secs(10 * 60);

/// Poll cadence while waiting for a contended lock.
const POLL_INTERVAL: Duration = Duration::from_millis(120);

/// Exclusive possession of a named resource, released on [`Lock::release`]
/// or drop.
#[derive(Debug)]
pub struct Lock {
    path: PathBuf,
    released: bool,
}

impl Lock {
    /// Acquire the lock named `name` under `dir`, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] when the lock stays contended past
    /// `timeout`, or an I/O error if the lease directory cannot be created.
    pub fn acquire(dir: &Path, name: &str, timeout: Duration) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating lock directory {}", dir.display()))?;
        let path = dir.join(format!("{}.lock", sanitize_lock_name(name)));
        let deadline = Instant::now() + timeout;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let now = SystemTime::now()
                        .duration_since(SystemTime::UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or(0);
                    let _ = writeln!(file, "pid={}\ncreated_unix={now}", std::process::id());
                    return Ok(Self {
                        path,
                        released: false,
                    });
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(&path, STALE_AFTER).unwrap_or(false) {
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(LockError::Timeout {
                            path: path.display().to_string(),
                        }
                        .into());
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("creating lock {}", path.display()));
                }
            }
        }
    }

    /// Path of the marker file, for diagnostics.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock. Removing an already-missing marker is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error only for I/O failures other than "not found".
    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("releasing lock {}", self.path.display()))
            }
        }
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        let _ = self.release_inner();
    }
}

/// Reduce a lock name to filesystem-safe characters.
///
/// Alphanumerics, `-`, `_`, and `.` are kept; everything else collapses to
/// `_`. An empty result falls back to `default`.
#[must_use]
pub fn sanitize_lock_name(name: &str) -> String {
    if name.is_empty() {
        return "default".to_string();
    }
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn is_stale(path: &Path, age: Duration) -> Result<bool> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(modified.elapsed().map(|e| e > age).unwrap_or(false))
}

// ── Unit tests ────────────────────────────────────────────────────────────────
