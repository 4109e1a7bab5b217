//! Settings persistence: load-or-create, atomic save, chained migration.
//!
//! Migration is an ordered list of `(from, to, transform)` steps applied
//! sequentially, with a timestamped backup snapshot written before the first
//! transform. Files newer than the supported schema are rejected rather than
//! guessed at.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

use crate::domain::settings::{SETTINGS_VERSION, Settings};

/// Resolve the data home: `OUTPOST_HOME` when set, else `~/.outpost`.
///
/// # Errors
///
/// Returns an error when the home directory cannot be determined.
pub fn data_home() -> Result<PathBuf> {
    if let Ok(explicit) = std::env::var("OUTPOST_HOME") {
        let trimmed = explicit.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.join(".outpost"))
}

/// Store over `<base>/settings.json`.
pub struct SettingsStore {
    base: PathBuf,
}

impl SettingsStore {
    /// Create a store rooted at the default data home.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self> {
        Ok(Self { base: data_home()? })
    }

    /// Create a store with an explicit base directory (used in tests).
    #[must_use]
    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.base.join("settings.json")
    }

    /// Load the settings file, migrating and re-defaulting as needed; write
    /// defaults when the file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, a malformed file, or a schema newer
    /// than this binary supports.
    pub fn load_or_create(&self) -> Result<Settings> {
        let path = self.path();
        if !path.exists() {
            let settings = Settings::defaults(&self.base);
            self.save(&settings)?;
            return Ok(settings);
        }

        let data = fs::read_to_string(&path)
            .with_context(|| format!("reading settings {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&data)
            .with_context(|| format!("parsing settings {}", path.display()))?;
        let settings = self.migrate(settings)?.normalized(&self.base);
        self.save(&settings)?;
        Ok(settings)
    }

    /// Persist settings atomically (temp file, then rename).
    ///
    /// # Errors
    ///
    /// Returns an error on serialization or I/O failure.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        fs::create_dir_all(&self.base)
            .with_context(|| format!("creating directory {}", self.base.display()))?;
        let mut data = serde_json::to_string_pretty(settings).context("serializing settings")?;
        data.push('\n');

        let path = self.path();
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, &data)
            .with_context(|| format!("writing temp settings {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("finalizing settings {}", path.display()))
    }

    fn migrate(&self, mut settings: Settings) -> Result<Settings> {
        if settings.version == 0 {
            settings.version = 1;
        }
        if settings.version > SETTINGS_VERSION {
            anyhow::bail!(
                "settings version {} is newer than supported {SETTINGS_VERSION}",
                settings.version
            );
        }
        if settings.version == SETTINGS_VERSION {
            return Ok(settings);
        }

        self.backup(&settings)?;
        while settings.version < SETTINGS_VERSION {
            let step = MIGRATION_PLAN
                .iter()
                .find(|s| s.from == settings.version)
                .ok_or_else(|| {
                    anyhow::anyhow!("missing migration step for version {}", settings.version)
                })?;
            settings = (step.run)(settings)?;
            settings.version = step.to;
        }
        Ok(settings)
    }

    fn backup(&self, settings: &Settings) -> Result<()> {
        fs::create_dir_all(&self.base)
            .with_context(|| format!("creating directory {}", self.base.display()))?;
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let path = self.base.join(format!("settings.backup.{stamp}.json"));
        let mut data =
            serde_json::to_string_pretty(settings).context("serializing settings backup")?;
        data.push('\n');
        fs::write(&path, data).with_context(|| format!("writing backup {}", path.display()))
    }
}

// ── Migration plan ────────────────────────────────────────────────────────────

struct MigrationStep {
    from: u32,
    to: u32,
    run: fn(Settings) -> Result<Settings>,
}

const MIGRATION_PLAN: &[MigrationStep] = &[
    MigrationStep {
        from: 1,
        to: 2,
        run: migrate_v1_to_v2,
    },
    MigrationStep {
        from: 2,
        to: 3,
        run: migrate_v2_to_v3,
    },
];

/// v2 introduced release channels.
fn migrate_v1_to_v2(mut settings: Settings) -> Result<Settings> {
    if settings.installer.release_channel.trim().is_empty() {
        settings.installer.release_channel = "latest".to_string();
    }
    Ok(settings)
}

/// v3 introduced signature enforcement; older files keep it off.
fn migrate_v2_to_v3(settings: Settings) -> Result<Settings> {
    Ok(settings)
}

// ── Unit tests ────────────────────────────────────────────────────────────────
