//! Crash-safe shared instance index.
//!
//! The index is the authoritative name→location mapping, decoupling instance
//! storage layout from lookup. Every save writes a temp file and renames it
//! over the index, so a crash mid-write never corrupts it. Read-modify-write
//! cycles (`upsert`, `remove_by_id`) are additionally serialized under a
//! registry-scoped lock: individual writes being atomic does not prevent a
//! lost update between two concurrent cycles.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::RegistryError;
use crate::domain::instance::Status;
use crate::infra::lock::Lock;

/// Index schema version.
pub const INDEX_VERSION: u32 = 1;

/// Name of the lock serializing registry read-modify-write cycles.
const REGISTRY_LOCK_NAME: &str = "registry";

/// Bound on waiting for the registry lock. Registry mutations are small;
/// anything longer than this means a stuck or crashed peer, and the marker
/// staleness reclamation takes over from there.
const REGISTRY_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

// ── Types ─────────────────────────────────────────────────────────────────────

/// Denormalized projection of an instance record inside the shared index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub display_name: String,
    pub path: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The persisted index document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    pub version: u32,
    pub entries: Vec<Entry>,
}

impl Default for Index {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            entries: Vec::new(),
        }
    }
}

/// Store over a single `index.json` file.
pub struct RegistryStore {
    path: PathBuf,
    lock_dir: PathBuf,
}

impl RegistryStore {
    #[must_use]
    pub fn new(path: PathBuf, lock_dir: PathBuf) -> Self {
        Self { path, lock_dir }
    }

    /// Load the index. A missing file is an empty, valid index.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Index> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Index::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("reading index {}", self.path.display()));
            }
        };
        let mut index: Index = serde_json::from_str(&data)
            .with_context(|| format!("parsing index {}", self.path.display()))?;
        if index.version == 0 {
            index.version = INDEX_VERSION;
        }
        Ok(index)
    }

    /// Save the index atomically (temp file, then rename over the index).
    ///
    /// # Errors
    ///
    /// Returns an error on serialization or I/O failure.
    pub fn save(&self, mut index: Index) -> Result<()> {
        index.version = INDEX_VERSION;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let mut data = serde_json::to_string_pretty(&index).context("serializing index")?;
        data.push('\n');

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &data)
            .with_context(|| format!("writing temp index {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path).map_err(|err| {
            let _ = fs::remove_file(&tmp_path);
            anyhow::Error::from(err).context(format!("finalizing index {}", self.path.display()))
        })
    }

    /// Insert or replace an entry by ID, preserving the original creation
    /// time when the incoming entry's is unset, then re-sort by display name
    /// for deterministic listing.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::IncompleteEntry`] when ID, display name, or
    /// path is empty.
    pub fn upsert(&self, mut entry: Entry) -> Result<()> {
        entry.id = entry.id.trim().to_string();
        entry.display_name = entry.display_name.trim().to_string();
        entry.path = entry.path.trim().to_string();
        if entry.id.is_empty() || entry.display_name.is_empty() || entry.path.is_empty() {
            return Err(RegistryError::IncompleteEntry.into());
        }

        let _guard = self.mutation_lock()?;
        let mut index = self.load()?;
        if let Some(existing) = index.entries.iter_mut().find(|e| e.id == entry.id) {
            if entry.created_at == unset_time() {
                entry.created_at = existing.created_at;
            }
            *existing = entry;
        } else {
            index.entries.push(entry);
        }
        index
            .entries
            .sort_by(|a, b| a.display_name.cmp(&b.display_name));
        self.save(index)
    }

    /// Remove the entry with `id`; unknown or empty IDs are a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error on load or save failure.
    pub fn remove_by_id(&self, id: &str) -> Result<()> {
        let id = id.trim();
        if id.is_empty() {
            return Ok(());
        }
        let _guard = self.mutation_lock()?;
        let mut index = self.load()?;
        index.entries.retain(|e| e.id != id);
        self.save(index)
    }

    /// Resolve a human-supplied reference: exact ID match first, then exact
    /// display-name match.
    ///
    /// # Errors
    ///
    /// Returns an error on load failure.
    pub fn resolve(&self, reference: &str) -> Result<Option<Entry>> {
        let needle = reference.trim();
        if needle.is_empty() {
            return Ok(None);
        }
        let index = self.load()?;
        if let Some(entry) = index.entries.iter().find(|e| e.id == needle) {
            return Ok(Some(entry.clone()));
        }
        Ok(index
            .entries
            .iter()
            .find(|e| e.display_name == needle)
            .cloned())
    }

    /// All entries, in display-name order.
    ///
    /// # Errors
    ///
    /// Returns an error on load failure.
    pub fn list(&self) -> Result<Vec<Entry>> {
        Ok(self.load()?.entries)
    }

    fn mutation_lock(&self) -> Result<Lock> {
        Lock::acquire(&self.lock_dir, REGISTRY_LOCK_NAME, REGISTRY_LOCK_TIMEOUT)
    }
}

/// Sentinel for "creation time not set" on an incoming entry.
#[must_use]
pub fn unset_time() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().unwrap_or_default()
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> RegistryStore {
        RegistryStore::new(dir.join("index.json"), dir.join("locks"))
    }

    fn entry(id: &str, name: &str) -> Entry {
        Entry {
            id: id.to_string(),
            display_name: name.to_string(),
            path: format!("/tmp/{name}"),
            status: Status::Installed,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_load_missing_file_is_empty_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let index = store(dir.path()).load().expect("load");
        assert_eq!(index.version, INDEX_VERSION);
        assert!(index.entries.is_empty());
    }

    #[test]
    fn test_upsert_then_resolve_by_id_and_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = store(dir.path());
        s.upsert(entry("id-1", "demo")).expect("upsert");

        let by_name = s.resolve("demo").expect("resolve").expect("found");
        let by_id = s.resolve("id-1").expect("resolve").expect("found");
        assert_eq!(by_name.id, by_id.id);
        assert_eq!(by_name.path, "/tmp/demo");
    }

    #[test]
    fn test_resolve_unknown_reference_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = store(dir.path());
        assert!(s.resolve("nope").expect("resolve").is_none());
        assert!(s.resolve("").expect("resolve").is_none());
    }

    #[test]
    fn test_upsert_replaces_by_id_and_preserves_created_at() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = store(dir.path());
        let original = entry("id-1", "demo");
        let created = original.created_at;
        s.upsert(original).expect("first upsert");

        let mut update = entry("id-1", "demo");
        update.created_at = unset_time();
        update.status = Status::Running;
        s.upsert(update).expect("second upsert");

        let entries = s.list().expect("list");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, Status::Running);
        assert_eq!(entries[0].created_at, created);
    }

    #[test]
    fn test_upsert_rejects_incomplete_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = store(dir.path());
        let mut incomplete = entry("id-1", "demo");
        incomplete.path = "   ".to_string();
        let err = s.upsert(incomplete).unwrap_err();
        assert!(err.to_string().contains("incomplete"), "got: {err}");
    }

    #[test]
    fn test_list_is_sorted_by_display_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = store(dir.path());
        s.upsert(entry("id-b", "bravo")).expect("upsert");
        s.upsert(entry("id-a", "alpha")).expect("upsert");

        let names: Vec<String> = s
            .list()
            .expect("list")
            .into_iter()
            .map(|e| e.display_name)
            .collect();
        assert_eq!(names, vec!["alpha", "bravo"]);
    }

    #[test]
    fn test_remove_by_id_then_list_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = store(dir.path());
        s.upsert(entry("id-1", "demo")).expect("upsert");
        s.remove_by_id("id-1").expect("remove");
        assert!(s.list().expect("list").is_empty());

        // removing an unknown ID is a no-op
        s.remove_by_id("id-1").expect("remove again");
    }

    #[test]
    fn test_save_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = store(dir.path());
        s.upsert(entry("id-1", "demo")).expect("upsert");
        assert!(dir.path().join("index.json").exists());
        assert!(!dir.path().join("index.json.tmp").exists());
    }

    #[test]
    fn test_concurrent_upserts_lose_no_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().to_path_buf();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let s = store(&path);
                    s.upsert(entry(&format!("id-{i}"), &format!("name-{i}")))
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join").expect("upsert");
        }

        let entries = store(&path).list().expect("list");
        assert_eq!(entries.len(), 8, "a lost update dropped entries");
    }
}
