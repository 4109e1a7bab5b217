//! Instance lifecycle service: install, start, stop, restart, status,
//! update, logs, list, delete.
//!
//! Every mutating operation follows the same shape: resolve the reference to
//! a target, acquire the instance lock, read the on-disk record, validate
//! the intended transition, perform the action, persist the record, upsert
//! the registry entry. The lock is released when the guard drops, so it
//! always runs.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::application::ports::{Reporter, WorkerSpawner};
use crate::domain::error::InstanceError;
use crate::domain::instance::{
    InstanceRecord, Status, instance_id, is_hex_id, normalize_name, validate_transition,
};
use crate::domain::settings::Settings;
use crate::infra::lock::Lock;
use crate::infra::process;
use crate::infra::registry::{Entry, RegistryStore};

/// Grace period granted to a worker before the stop escalates.
const STOP_GRACE: Duration = Duration::from_secs(6);

/// Shorter grace used when deleting an instance outright.
const DELETE_GRACE: Duration = Duration::from_secs(5);

/// Default number of log lines shown by `logs`.
pub const DEFAULT_LOG_TAIL: usize = 50;

// ── Types ─────────────────────────────────────────────────────────────────────

/// A resolved instance reference.
#[derive(Debug, Clone)]
pub struct InstanceTarget {
    pub id: String,
    pub display_name: String,
    pub dir: PathBuf,
    pub config_path: PathBuf,
}

/// Outcome of `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The stored PID was already alive; nothing was spawned.
    AlreadyRunning { pid: i32 },
    /// A fresh worker was spawned.
    Started { pid: i32 },
}

/// Snapshot returned by `status`.
#[derive(Debug, Clone)]
pub struct StatusView {
    pub display_name: String,
    pub id: String,
    /// Effective state: observed liveness wins over the persisted status.
    pub state: Status,
    pub pid: i32,
    pub updated_at: chrono::DateTime<Utc>,
}

/// Lifecycle service over one data home.
pub struct InstanceService<'a> {
    settings: &'a Settings,
    reporter: &'a dyn Reporter,
}

impl<'a> InstanceService<'a> {
    #[must_use]
    pub fn new(settings: &'a Settings, reporter: &'a dyn Reporter) -> Self {
        Self { settings, reporter }
    }

    // ── Operations ────────────────────────────────────────────────────────

    /// Install (or re-install) the instance named `name`.
    ///
    /// # Errors
    ///
    /// Returns an error on lock timeout, an invalid transition from the
    /// existing record's status, or I/O failure.
    pub fn install(&self, name: &str) -> Result<InstanceTarget> {
        let display_name = normalize_name(name);
        let id = instance_id(&display_name);
        let dir = self.instances_dir().join(&id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating instance directory {}", dir.display()))?;
        let _lock = self.acquire_lock(&id)?;

        let now = Utc::now();
        let config_path = dir.join("config.json");
        let record = match read_record(&config_path) {
            Ok(mut existing) => {
                validate_transition(Some(existing.status), Status::Installed)?;
                existing.status = Status::Installed;
                existing.display_name = display_name.clone();
                existing.id = id.clone();
                existing.updated_at = now;
                existing
            }
            Err(err) if is_not_found(&err) => InstanceRecord::new(&display_name, now),
            Err(err) => return Err(err),
        };

        write_record(&config_path, &record)?;
        self.upsert_registry(&record, &dir)?;

        // Touch the log so `logs` works before the first start.
        let log_path = dir.join("instance.log");
        fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&log_path)
            .with_context(|| format!("creating instance log {}", log_path.display()))?;

        self.reporter
            .info(&format!("instance directory: {}", dir.display()));
        Ok(InstanceTarget {
            id,
            display_name,
            dir,
            config_path,
        })
    }

    /// Start the instance worker as a detached child process.
    ///
    /// A live stored PID makes this a no-op reporting the existing PID; a
    /// dead stored PID is cleared before re-validating the transition.
    ///
    /// # Errors
    ///
    /// Returns an error when the instance is not installed, the transition
    /// is invalid, or spawning fails.
    pub fn start(&self, name: &str, spawner: &dyn WorkerSpawner) -> Result<StartOutcome> {
        let target = self.resolve_target(name)?;
        let _lock = self.acquire_lock(&target.id)?;

        let mut record = self.read_installed(&target)?;
        if record.pid != 0 {
            if process::is_alive(record.pid) {
                self.reporter
                    .info(&format!("instance already running with pid {}", record.pid));
                return Ok(StartOutcome::AlreadyRunning { pid: record.pid });
            }
            self.reporter.warn(&format!(
                "stale pid {} found in config, recovering",
                record.pid
            ));
            record.pid = 0;
        }
        validate_transition(Some(record.status), Status::Running)?;

        let log_path = target.dir.join("instance.log");
        let pid = spawner.spawn(&record.id, &record.display_name, &target.dir, &log_path)?;

        record.status = Status::Running;
        record.pid = pid;
        record.updated_at = Utc::now();
        write_record(&target.config_path, &record)?;
        self.upsert_registry(&record, &target.dir)?;
        Ok(StartOutcome::Started { pid })
    }

    /// Stop the instance worker with a grace period, then clear its PID.
    ///
    /// # Errors
    ///
    /// Returns an error when the instance is not installed, the transition
    /// is invalid, or signaling fails for a reason other than "already
    /// gone".
    pub fn stop(&self, name: &str) -> Result<()> {
        let target = self.resolve_target(name)?;
        let _lock = self.acquire_lock(&target.id)?;

        let mut record = self.read_installed(&target)?;
        validate_transition(Some(record.status), Status::Stopped)?;

        if record.pid > 0 {
            process::stop(record.pid, STOP_GRACE)?;
        }
        record.status = Status::Stopped;
        record.pid = 0;
        record.updated_at = Utc::now();
        write_record(&target.config_path, &record)?;
        self.upsert_registry(&record, &target.dir)
    }

    /// Stop then start.
    ///
    /// # Errors
    ///
    /// Propagates the first failing half.
    pub fn restart(&self, name: &str, spawner: &dyn WorkerSpawner) -> Result<StartOutcome> {
        self.stop(name)?;
        self.start(name, spawner)
    }

    /// Report the instance's effective state.
    ///
    /// A stored `running` with a dead PID is reported as `stopped`; a live
    /// PID is reported as `running` regardless of the stored status.
    ///
    /// # Errors
    ///
    /// Returns an error when the instance is not installed.
    pub fn status(&self, name: &str) -> Result<StatusView> {
        let target = self.resolve_target(name)?;
        let record = match read_record(&target.config_path) {
            Ok(record) => record,
            Err(err) if is_not_found(&err) => {
                return Err(InstanceError::NotInstalled {
                    name: target.display_name,
                }
                .into());
            }
            Err(err) => return Err(err),
        };

        let alive = record.pid > 0 && process::is_alive(record.pid);
        let state = if alive {
            Status::Running
        } else if record.status == Status::Running {
            Status::Stopped
        } else {
            record.status
        };

        Ok(StatusView {
            display_name: record.display_name,
            id: record.id,
            state,
            pid: record.pid,
            updated_at: record.updated_at,
        })
    }

    /// Run the `installed → updating → installed` round trip, enforcing the
    /// full transition table at each edge.
    ///
    /// # Errors
    ///
    /// Returns an error when the instance is not installed or either
    /// transition is invalid.
    pub fn update(&self, name: &str) -> Result<()> {
        let target = self.resolve_target(name)?;
        let _lock = self.acquire_lock(&target.id)?;

        let mut record = self.read_installed(&target)?;
        validate_transition(Some(record.status), Status::Updating)?;
        record.status = Status::Updating;
        record.updated_at = Utc::now();
        write_record(&target.config_path, &record)?;

        validate_transition(Some(record.status), Status::Installed)?;
        record.status = Status::Installed;
        record.updated_at = Utc::now();
        write_record(&target.config_path, &record)?;
        self.upsert_registry(&record, &target.dir)?;

        self.reporter.info(&format!(
            "updated timestamp: {}",
            record.updated_at.to_rfc3339()
        ));
        Ok(())
    }

    /// Tail the instance log.
    ///
    /// # Errors
    ///
    /// Returns an error when the log file does not exist.
    pub fn logs(&self, name: &str, tail: usize) -> Result<Vec<String>> {
        let target = self.resolve_target(name)?;
        let log_path = target.dir.join("instance.log");
        let data = match fs::read_to_string(&log_path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(InstanceError::LogNotFound(target.display_name).into());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("reading instance log {}", log_path.display()));
            }
        };

        let tail = if tail == 0 { DEFAULT_LOG_TAIL } else { tail };
        let lines: Vec<String> = data.lines().map(ToString::to_string).collect();
        let skip = lines.len().saturating_sub(tail);
        Ok(lines.into_iter().skip(skip).collect())
    }

    /// List all registered instances, re-syncing the registry from disk when
    /// it is empty.
    ///
    /// # Errors
    ///
    /// Returns an error on registry I/O failure.
    pub fn list(&self) -> Result<Vec<Entry>> {
        let store = self.registry();
        let mut entries = store.list()?;
        if entries.is_empty() {
            self.sync_registry_from_disk()?;
            entries = store.list()?;
        }
        Ok(entries)
    }

    /// Delete the instance: stop a live worker, remove the directory, the
    /// registry entry, and the instance's lock marker.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn delete(&self, name: &str) -> Result<()> {
        let target = self.resolve_target(name)?;

        if let Ok(record) = read_record(&target.config_path) {
            if record.pid > 0 && process::is_alive(record.pid) {
                let _ = process::stop(record.pid, DELETE_GRACE);
            }
        }
        if target.dir.exists() {
            fs::remove_dir_all(&target.dir)
                .with_context(|| format!("removing instance directory {}", target.dir.display()))?;
        }
        self.registry().remove_by_id(&target.id)?;

        let marker = self.locks_dir().join(format!("{}.lock", target.id));
        if let Err(err) = fs::remove_file(&marker) {
            if err.kind() != std::io::ErrorKind::NotFound {
                return Err(err)
                    .with_context(|| format!("removing lock marker {}", marker.display()));
            }
        }
        self.reporter
            .success(&format!("instance '{}' removed", target.display_name));
        Ok(())
    }

    // ── Resolution and paths ──────────────────────────────────────────────

    /// Resolve a human-supplied reference (ID or display name) to a target,
    /// falling back to deterministic ID derivation when unregistered.
    ///
    /// # Errors
    ///
    /// Returns an error on registry I/O failure.
    pub fn resolve_target(&self, reference: &str) -> Result<InstanceTarget> {
        let base = self.instances_dir();
        let resolved = normalize_name(reference);

        if let Some(entry) = self.registry().resolve(&resolved)? {
            let dir = {
                let trimmed = entry.path.trim();
                if trimmed.is_empty() || !Path::new(trimmed).is_absolute() {
                    base.join(&entry.id)
                } else {
                    PathBuf::from(trimmed)
                }
            };
            let display_name = {
                let trimmed = entry.display_name.trim();
                if trimmed.is_empty() {
                    resolved
                } else {
                    trimmed.to_string()
                }
            };
            return Ok(InstanceTarget {
                id: entry.id,
                display_name,
                config_path: dir.join("config.json"),
                dir,
            });
        }

        let id = if is_hex_id(&resolved) {
            resolved.clone()
        } else {
            instance_id(&resolved)
        };
        let dir = base.join(&id);
        Ok(InstanceTarget {
            id,
            display_name: resolved,
            config_path: dir.join("config.json"),
            dir,
        })
    }

    fn data_root(&self) -> PathBuf {
        PathBuf::from(self.settings.installer.data_home.trim())
    }

    fn instances_dir(&self) -> PathBuf {
        self.data_root().join("instances")
    }

    fn locks_dir(&self) -> PathBuf {
        self.data_root().join("locks")
    }

    fn registry(&self) -> RegistryStore {
        RegistryStore::new(self.instances_dir().join("index.json"), self.locks_dir())
    }

    fn acquire_lock(&self, id: &str) -> Result<Lock> {
        let timeout = Duration::from_secs(self.settings.installer.lock_timeout_seconds);
        Lock::acquire(&self.locks_dir(), id, timeout)
    }

    fn read_installed(&self, target: &InstanceTarget) -> Result<InstanceRecord> {
        match read_record(&target.config_path) {
            Ok(record) => Ok(record),
            Err(err) if is_not_found(&err) => Err(InstanceError::NotInstalled {
                name: target.display_name.clone(),
            }
            .into()),
            Err(err) => Err(err),
        }
    }

    fn upsert_registry(&self, record: &InstanceRecord, dir: &Path) -> Result<()> {
        self.registry().upsert(Entry {
            id: record.id.clone(),
            display_name: record.display_name.clone(),
            path: dir.display().to_string(),
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    fn sync_registry_from_disk(&self) -> Result<()> {
        let base = self.instances_dir();
        let entries = match fs::read_dir(&base) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(err).with_context(|| format!("listing instances {}", base.display()));
            }
        };

        for dir_entry in entries.filter_map(Result::ok) {
            let path = dir_entry.path();
            if !path.is_dir() {
                continue;
            }
            let Ok(record) = read_record(&path.join("config.json")) else {
                continue;
            };
            self.upsert_registry(&record, &path)?;
        }
        Ok(())
    }
}

// ── Record persistence ────────────────────────────────────────────────────────

fn read_record(path: &Path) -> Result<InstanceRecord> {
    let data = fs::read_to_string(path)?;
    let record: InstanceRecord =
        serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(record)
}

fn write_record(path: &Path, record: &InstanceRecord) -> Result<()> {
    let mut data = serde_json::to_string_pretty(record).context("serializing instance record")?;
    data.push('\n');

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &data)
        .with_context(|| format!("writing temp record {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("finalizing record {}", path.display()))
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound)
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::application::ports::NullReporter;

    /// Spawner that starts a real sleeping process so liveness checks see a
    /// live PID without re-entering the test binary.
    struct SleepSpawner;

    impl WorkerSpawner for SleepSpawner {
        fn spawn(&self, _: &str, _: &str, _: &Path, log_path: &Path) -> Result<i32> {
            let log = fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(log_path)?;
            let child = std::process::Command::new("sleep")
                .arg("30")
                .stdout(std::process::Stdio::from(log))
                .spawn()?;
            #[allow(clippy::cast_possible_wrap)]
            let pid = child.id() as i32;
            Ok(pid)
        }
    }

    /// Spawner that fabricates a PID that was never alive.
    struct DeadSpawner;

    impl WorkerSpawner for DeadSpawner {
        fn spawn(&self, _: &str, _: &str, _: &Path, _: &Path) -> Result<i32> {
            Ok(i32::MAX - 1)
        }
    }

    fn settings(dir: &Path) -> Settings {
        Settings::defaults(dir)
    }

    #[test]
    fn test_install_creates_record_registry_and_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = settings(dir.path());
        let service = InstanceService::new(&settings, &NullReporter);

        let target = service.install("demo").expect("install");
        assert!(target.config_path.exists());
        assert!(target.dir.join("instance.log").exists());

        let record = read_record(&target.config_path).expect("record");
        assert_eq!(record.status, Status::Installed);
        assert_eq!(record.pid, 0);
        assert_eq!(record.id, instance_id("demo"));

        let entries = service.list().expect("list");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].display_name, "demo");
    }

    #[test]
    fn test_install_is_idempotent_and_preserves_created_at() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = settings(dir.path());
        let service = InstanceService::new(&settings, &NullReporter);

        let target = service.install("demo").expect("install");
        let created = read_record(&target.config_path).expect("record").created_at;
        service.install("demo").expect("re-install");
        let record = read_record(&target.config_path).expect("record");
        assert_eq!(record.created_at, created);
        assert_eq!(record.status, Status::Installed);
    }

    #[cfg(unix)]
    #[test]
    fn test_start_stop_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = settings(dir.path());
        let service = InstanceService::new(&settings, &NullReporter);
        service.install("demo").expect("install");

        let outcome = service.start("demo", &SleepSpawner).expect("start");
        let StartOutcome::Started { pid } = outcome else {
            panic!("expected a fresh start, got {outcome:?}");
        };
        assert!(process::is_alive(pid));

        let view = service.status("demo").expect("status");
        assert_eq!(view.state, Status::Running);
        assert_eq!(view.pid, pid);

        service.stop("demo").expect("stop");
        let view = service.status("demo").expect("status");
        assert_eq!(view.state, Status::Stopped);
        assert_eq!(view.pid, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_start_when_already_running_is_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = settings(dir.path());
        let service = InstanceService::new(&settings, &NullReporter);
        service.install("demo").expect("install");

        let StartOutcome::Started { pid } =
            service.start("demo", &SleepSpawner).expect("first start")
        else {
            panic!("expected started");
        };
        let outcome = service.start("demo", &SleepSpawner).expect("second start");
        assert_eq!(outcome, StartOutcome::AlreadyRunning { pid });

        service.stop("demo").expect("stop");
    }

    #[test]
    fn test_start_clears_stale_pid_before_revalidating() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = settings(dir.path());
        let service = InstanceService::new(&settings, &NullReporter);
        service.install("demo").expect("install");

        // First start records a PID that is dead by the next start.
        service.start("demo", &DeadSpawner).expect("start");
        let outcome = service.start("demo", &DeadSpawner).expect("restart over stale pid");
        assert!(matches!(outcome, StartOutcome::Started { .. }));
    }

    #[test]
    fn test_start_unknown_instance_suggests_install() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = settings(dir.path());
        let service = InstanceService::new(&settings, &NullReporter);

        let err = service.start("ghost", &DeadSpawner).unwrap_err();
        assert!(err.to_string().contains("not installed"), "got: {err}");
        assert!(err.to_string().contains("outpost install"), "got: {err}");
    }

    #[test]
    fn test_status_degrades_stored_running_with_dead_pid() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = settings(dir.path());
        let service = InstanceService::new(&settings, &NullReporter);
        service.install("demo").expect("install");
        service.start("demo", &DeadSpawner).expect("start");

        let view = service.status("demo").expect("status");
        assert_eq!(view.state, Status::Stopped);
    }

    #[test]
    fn test_update_round_trips_through_updating() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = settings(dir.path());
        let service = InstanceService::new(&settings, &NullReporter);
        let target = service.install("demo").expect("install");

        service.update("demo").expect("update");
        let record = read_record(&target.config_path).expect("record");
        assert_eq!(record.status, Status::Installed);
    }

    #[test]
    fn test_resolve_target_accepts_hex_id_verbatim() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = settings(dir.path());
        let service = InstanceService::new(&settings, &NullReporter);

        let id = instance_id("demo");
        let target = service.resolve_target(&id).expect("resolve");
        assert_eq!(target.id, id);
    }

    #[test]
    fn test_resolve_target_by_display_name_after_install() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = settings(dir.path());
        let service = InstanceService::new(&settings, &NullReporter);
        let installed = service.install("demo").expect("install");

        let by_name = service.resolve_target("demo").expect("resolve");
        assert_eq!(by_name.id, installed.id);
        assert_eq!(by_name.dir, installed.dir);
    }

    #[test]
    fn test_logs_tails_last_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = settings(dir.path());
        let service = InstanceService::new(&settings, &NullReporter);
        let target = service.install("demo").expect("install");

        let content: String = (1..=60).map(|i| format!("line {i}\n")).collect();
        fs::write(target.dir.join("instance.log"), content).expect("write log");

        let lines = service.logs("demo", 0).expect("logs");
        assert_eq!(lines.len(), DEFAULT_LOG_TAIL);
        assert_eq!(lines.last().map(String::as_str), Some("line 60"));

        let lines = service.logs("demo", 5).expect("logs");
        assert_eq!(lines.first().map(String::as_str), Some("line 56"));
    }

    #[test]
    fn test_logs_missing_file_is_domain_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = settings(dir.path());
        let service = InstanceService::new(&settings, &NullReporter);
        let err = service.logs("ghost", 10).unwrap_err();
        assert!(err.to_string().contains("log not found"), "got: {err}");
    }

    #[test]
    fn test_delete_removes_record_registry_and_lock_marker() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = settings(dir.path());
        let service = InstanceService::new(&settings, &NullReporter);
        let target = service.install("demo").expect("install");

        service.delete("demo").expect("delete");
        assert!(!target.dir.exists());
        assert!(service.list().expect("list").is_empty());
    }

    #[test]
    fn test_list_resyncs_registry_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = settings(dir.path());
        let service = InstanceService::new(&settings, &NullReporter);
        let target = service.install("demo").expect("install");

        // Simulate a lost index: the instance directory survives.
        fs::remove_file(dir.path().join("instances").join("index.json")).expect("drop index");

        let entries = service.list().expect("list");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, target.id);
    }
}
