//! Settings schema, defaults, and pure normalization.
//!
//! The settings file is the validated-input collaborator: the lifecycle,
//! update, and installer services consume these values as-is and never
//! re-default them. Loading, saving, and migration live in
//! `crate::infra::settings`.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Current settings schema version. Older files are migrated on load.
pub const SETTINGS_VERSION: u32 = 3;

// ── Sections ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerSettings {
    /// `owner/name` of the release repository.
    pub repo: String,
    /// Release channel: `latest` or a literal tag.
    pub release_channel: String,
    /// Root directory for instances, locks, and logs.
    pub data_home: String,
    /// Heartbeat interval of the detached instance worker, in seconds.
    pub instance_tick_seconds: u64,
    /// Bound on waiting for an instance lock.
    pub lock_timeout_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterSettings {
    /// When set, a missing or invalid signature aborts the update.
    pub require_signature: bool,
    /// Minisign public key (base64 body) used to verify release assets.
    pub minisign_public_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorSettings {
    /// Ordered candidate prefixes probed before downloads.
    pub urls: Vec<String>,
    /// Health-check URL probed through each candidate.
    pub probe_url: String,
    /// Per-probe timeout.
    pub probe_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GitMirror {
    pub name: String,
    pub base_url: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GitSettings {
    pub mirrors: Vec<GitMirror>,
    /// When set, rewritten mirror sources are tried before the origin URL.
    pub mirror_first: bool,
    pub retry_per_source: u32,
    pub retry_backoff_seconds: u64,
    pub command_timeout_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSettings {
    /// Remote catalog endpoints, scanned after the builtin catalog.
    pub catalog_urls: Vec<String>,
    pub catalog_timeout_seconds: u64,
    pub install_retries: u32,
    pub install_backoff_seconds: u64,
    /// When set, remote catalogs take priority over the builtin catalog.
    pub prefer_catalog_source: bool,
}

/// Top-level settings stored in `<data home>/settings.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub version: u32,
    pub installer: InstallerSettings,
    pub updater: UpdaterSettings,
    pub mirrors: MirrorSettings,
    pub git: GitSettings,
    pub modules: ModuleSettings,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Settings {
    /// Built-in defaults rooted at `base`.
    #[must_use]
    pub fn defaults(base: &Path) -> Self {
        Self {
            version: SETTINGS_VERSION,
            installer: InstallerSettings {
                repo: "OutpostLabsHQ/outpost-agent".to_string(),
                release_channel: "latest".to_string(),
                data_home: base.display().to_string(),
                instance_tick_seconds: 15,
                lock_timeout_seconds: 8,
            },
            updater: UpdaterSettings {
                require_signature: false,
                minisign_public_key: String::new(),
            },
            mirrors: MirrorSettings {
                urls: vec![
                    "https://ghfast.top".to_string(),
                    "https://gh-proxy.com".to_string(),
                    "https://github.moeyy.xyz".to_string(),
                ],
                probe_url: "https://raw.githubusercontent.com/OutpostLabsHQ/catalog/refs/heads/main/modules.json".to_string(),
                probe_seconds: 8,
            },
            git: GitSettings {
                mirrors: Vec::new(),
                mirror_first: true,
                retry_per_source: 2,
                retry_backoff_seconds: 1,
                command_timeout_seconds: 120,
            },
            modules: ModuleSettings {
                catalog_urls: Vec::new(),
                catalog_timeout_seconds: 5,
                install_retries: 2,
                install_backoff_seconds: 1,
                prefer_catalog_source: false,
            },
        }
    }

    /// Fill zero/empty fields from defaults and merge the shared download
    /// mirrors into the git mirror list (deduplicated by base URL).
    #[must_use]
    pub fn normalized(mut self, base: &Path) -> Self {
        let d = Self::defaults(base);

        if self.version == 0 {
            self.version = d.version;
        }
        let inst = &mut self.installer;
        if inst.repo.trim().is_empty() {
            inst.repo = d.installer.repo;
        }
        if inst.release_channel.trim().is_empty() {
            inst.release_channel = d.installer.release_channel;
        }
        if inst.data_home.trim().is_empty() {
            inst.data_home = d.installer.data_home;
        }
        if inst.instance_tick_seconds == 0 {
            inst.instance_tick_seconds = d.installer.instance_tick_seconds;
        }
        if inst.lock_timeout_seconds == 0 {
            inst.lock_timeout_seconds = d.installer.lock_timeout_seconds;
        }

        if self.mirrors.urls.is_empty() {
            self.mirrors.urls = d.mirrors.urls;
        }
        if self.mirrors.probe_url.trim().is_empty() {
            self.mirrors.probe_url = d.mirrors.probe_url;
        }
        if self.mirrors.probe_seconds == 0 {
            self.mirrors.probe_seconds = d.mirrors.probe_seconds;
        }

        if self.git.retry_per_source == 0 {
            self.git.retry_per_source = d.git.retry_per_source;
        }
        if self.git.command_timeout_seconds == 0 {
            self.git.command_timeout_seconds = d.git.command_timeout_seconds;
        }
        let shared = shared_git_mirrors(&self.mirrors.urls);
        self.git.mirrors = merge_git_mirrors(shared, std::mem::take(&mut self.git.mirrors));
        for mirror in &mut self.git.mirrors {
            if mirror.name.trim().is_empty() {
                mirror.name = "mirror".to_string();
            }
        }

        if self.modules.catalog_timeout_seconds == 0 {
            self.modules.catalog_timeout_seconds = d.modules.catalog_timeout_seconds;
        }
        if self.modules.install_retries == 0 {
            self.modules.install_retries = d.modules.install_retries;
        }

        self
    }
}

/// Project the shared download mirrors onto enabled git mirrors.
fn shared_git_mirrors(urls: &[String]) -> Vec<GitMirror> {
    urls.iter()
        .enumerate()
        .filter_map(|(idx, raw)| {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return None;
            }
            let host = trimmed
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .split('/')
                .next()
                .unwrap_or("shared-mirror")
                .replace('.', "-");
            Some(GitMirror {
                name: format!("{host}-{}", idx + 1),
                base_url: trimmed.to_string(),
                enabled: true,
            })
        })
        .collect()
}

fn merge_git_mirrors(primary: Vec<GitMirror>, secondary: Vec<GitMirror>) -> Vec<GitMirror> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(primary.len() + secondary.len());
    for mirror in primary.into_iter().chain(secondary) {
        let key = mirror.base_url.trim().to_string();
        if key.is_empty() || !seen.insert(key) {
            continue;
        }
        out.push(mirror);
    }
    out
}

// ── Unit tests ────────────────────────────────────────────────────────────────
