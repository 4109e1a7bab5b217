//! Release manifest parsing and platform asset resolution.
//!
//! The manifest is a line-oriented `key=value` text file published next to
//! every release:
//!
//! ```text
//! version=v1.4.0
//! installer_version=1.4.0
//! asset.linux.amd64.binary.name=outpost-linux-amd64
//! asset.linux.amd64.binary.url=https://example.com/outpost-linux-amd64
//! asset.linux.amd64.binary.sha256=ab12...
//! asset.linux.amd64.binary.sig_url=https://example.com/outpost-linux-amd64.minisig
//! ```
//!
//! Pure parsing only — fetching lives in the infra layer.

use std::collections::BTreeMap;

use crate::domain::error::{ManifestError, UpdateError};

// ── Types ─────────────────────────────────────────────────────────────────────

/// One downloadable platform binary declared by a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub url: String,
    /// Lowercase hex SHA-256 of the binary.
    pub sha256: String,
    /// Optional detached-signature URL; `<url>.minisig` when empty.
    pub sig_url: String,
}

/// A parsed release descriptor.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub version: String,
    /// Overrides the release version for the installer binary when set.
    pub installer_version: String,
    /// Platform key (`<os>.<arch>`) to asset.
    pub assets: BTreeMap<String, Asset>,
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse a manifest document.
///
/// Blank lines and `#` comments are skipped. Every other line must be a
/// `key=value` pair; unknown non-asset keys are ignored.
///
/// # Errors
///
/// Returns an error on malformed lines or asset keys, a missing version,
/// an empty asset table, or any asset without a name and checksum.
pub fn parse_manifest(data: &str) -> Result<Manifest, ManifestError> {
    let mut manifest = Manifest::default();

    for (idx, raw) in data.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(ManifestError::InvalidLine(idx + 1));
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "version" => manifest.version = value.to_string(),
            "installer_version" => manifest.installer_version = value.to_string(),
            _ => apply_asset_kv(&mut manifest, key, value)?,
        }
    }

    if manifest.version.is_empty() {
        return Err(ManifestError::MissingVersion);
    }
    if manifest.assets.is_empty() {
        return Err(ManifestError::NoAssets);
    }
    for (platform, asset) in &manifest.assets {
        if asset.name.is_empty() || asset.sha256.is_empty() {
            return Err(ManifestError::IncompleteAsset(platform.clone()));
        }
    }

    Ok(manifest)
}

/// Resolve the asset for a host platform.
///
/// # Errors
///
/// Returns an error when the platform itself is unsupported or the manifest
/// declares no asset for it.
pub fn resolve_asset(manifest: &Manifest, os: &str, arch: &str) -> anyhow::Result<Asset> {
    let key = platform_key(os, arch)?;
    manifest
        .assets
        .get(&key)
        .cloned()
        .ok_or_else(|| ManifestError::MissingPlatformAsset(key).into())
}

/// Map host OS/arch constants onto the manifest's platform vocabulary
/// (`linux.amd64`, `darwin.arm64`, ...).
///
/// # Errors
///
/// Returns [`UpdateError::UnsupportedPlatform`] for unknown combinations.
pub fn platform_key(os: &str, arch: &str) -> Result<String, UpdateError> {
    let os_key = match os {
        "linux" => "linux",
        "macos" => "darwin",
        "windows" => "windows",
        _ => {
            return Err(UpdateError::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            });
        }
    };
    let arch_key = match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        _ => {
            return Err(UpdateError::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            });
        }
    };
    Ok(format!("{os_key}.{arch_key}"))
}

fn apply_asset_kv(manifest: &mut Manifest, key: &str, value: &str) -> Result<(), ManifestError> {
    if !key.starts_with("asset.") {
        return Ok(());
    }
    let parts: Vec<&str> = key.split('.').collect();
    if parts.len() != 5 {
        return Err(ManifestError::InvalidAssetKey(key.to_string()));
    }
    if parts[3] != "binary" {
        return Err(ManifestError::UnsupportedNamespace(key.to_string()));
    }

    let platform = format!("{}.{}", parts[1], parts[2]);
    let asset = manifest.assets.entry(platform).or_default();
    match parts[4] {
        "name" => asset.name = value.to_string(),
        "url" => asset.url = value.to_string(),
        "sha256" => asset.sha256 = value.to_lowercase(),
        "sig_url" => asset.sig_url = value.to_string(),
        _ => return Err(ManifestError::InvalidAssetField(key.to_string())),
    }
    Ok(())
}

// ── Unit tests ────────────────────────────────────────────────────────────────
