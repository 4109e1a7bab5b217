//! Self-update: manifest fetch, checksum and signature verification, atomic
//! binary swap with rollback.
//!
//! The update must never leave the executable in a broken state: every
//! verification happens before any file replacement, and the swap goes
//! through `<exe>.new` / `<exe>.bak` renames so the previous binary stays
//! recoverable until the new one is in place.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::application::ports::{ReleaseFetcher, Reporter};
use crate::domain::error::UpdateError;
use crate::domain::instance::hex_encode;
use crate::domain::release::{Asset, parse_manifest, resolve_asset};
use crate::domain::settings::Settings;

/// Outcome of an update run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Already on the target version; nothing was touched.
    UpToDate { version: String },
    /// The executable was replaced.
    Updated { from: String, to: String },
}

/// Self-update service over an injected fetcher.
pub struct SelfUpdater<'a> {
    settings: &'a Settings,
    fetcher: &'a dyn ReleaseFetcher,
    reporter: &'a dyn Reporter,
}

impl<'a> SelfUpdater<'a> {
    #[must_use]
    pub fn new(
        settings: &'a Settings,
        fetcher: &'a dyn ReleaseFetcher,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            settings,
            fetcher,
            reporter,
        }
    }

    /// Run the full update procedure against `exe_path`.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, a malformed manifest, a checksum
    /// or signature mismatch (always before any file replacement), or a
    /// failed swap.
    pub fn run(&self, current_version: &str, exe_path: &Path) -> Result<UpdateOutcome> {
        let repo = self.settings.installer.repo.trim();
        let tag = self.resolve_tag(repo)?;

        let manifest_url = release_download_url(repo, &tag, "manifest.txt");
        let manifest_body = self
            .fetcher
            .fetch(&manifest_url)
            .with_context(|| format!("fetching manifest {manifest_url}"))?;
        let mut manifest = parse_manifest(&String::from_utf8_lossy(&manifest_body))?;
        if manifest.version.is_empty() {
            manifest.version = tag.clone();
        }
        let asset = resolve_asset(&manifest, std::env::consts::OS, std::env::consts::ARCH)?;

        let target = if manifest.installer_version.is_empty() {
            manifest.version.clone()
        } else {
            manifest.installer_version.clone()
        };
        if !is_newer(&target, current_version) {
            self.reporter
                .info(&format!("already on the latest version ({current_version})"));
            return Ok(UpdateOutcome::UpToDate {
                version: current_version.to_string(),
            });
        }

        let url = if asset.url.trim().is_empty() {
            release_download_url(repo, &manifest.version, &asset.name)
        } else {
            asset.url.trim().to_string()
        };
        self.reporter.info(&format!("downloading {url}"));
        let binary = self
            .fetcher
            .fetch(&url)
            .with_context(|| format!("downloading {url}"))?;

        let want = asset.sha256.trim().to_lowercase();
        let have = hex_encode(&Sha256::digest(&binary));
        if want != have {
            return Err(UpdateError::ChecksumMismatch {
                asset: asset.name.clone(),
                want,
                have,
            }
            .into());
        }

        self.verify_signature_if_required(&asset, &url, &binary)?;

        apply_binary(exe_path, &binary)?;
        self.reporter
            .success(&format!("updated {current_version} -> {target}"));
        Ok(UpdateOutcome::Updated {
            from: current_version.to_string(),
            to: target,
        })
    }

    /// Resolve the release tag for the configured channel: `latest` queries
    /// the release API, anything else is a literal tag.
    fn resolve_tag(&self, repo: &str) -> Result<String> {
        let channel = self.settings.installer.release_channel.trim();
        if !channel.is_empty() && channel != "latest" {
            return Ok(channel.to_string());
        }
        let url = format!("https://api.github.com/repos/{repo}/releases/latest");
        let body = self
            .fetcher
            .fetch(&url)
            .with_context(|| format!("querying latest release {url}"))?;
        let release: serde_json::Value =
            serde_json::from_slice(&body).context("parsing latest release response")?;
        let tag = release
            .get("tag_name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();
        if tag.is_empty() {
            anyhow::bail!("latest release tag is empty");
        }
        Ok(tag)
    }

    fn verify_signature_if_required(&self, asset: &Asset, url: &str, binary: &[u8]) -> Result<()> {
        let public_key = self.settings.updater.minisign_public_key.trim();
        let required = self.settings.updater.require_signature;
        if !required && public_key.is_empty() {
            return Ok(());
        }
        if public_key.is_empty() {
            return Err(UpdateError::SignatureRequired.into());
        }

        let sig_url = if asset.sig_url.trim().is_empty() {
            format!("{url}.minisig")
        } else {
            asset.sig_url.trim().to_string()
        };
        let sig_data = match self.fetcher.fetch(&sig_url) {
            Ok(data) => data,
            Err(err) if required => {
                return Err(err.context(format!("fetching signature {sig_url}")));
            }
            Err(err) => {
                self.reporter
                    .warn(&format!("signature verification skipped: {err}"));
                return Ok(());
            }
        };

        minisign::verify(public_key, &String::from_utf8_lossy(&sig_data), binary)?;
        self.reporter.info("signature verified");
        Ok(())
    }
}

fn release_download_url(repo: &str, tag: &str, file: &str) -> String {
    format!("https://github.com/{repo}/releases/download/{tag}/{file}")
}

/// Semver comparison with a string-inequality fallback for non-semver tags.
fn is_newer(target: &str, current: &str) -> bool {
    let target_trimmed = target.trim().trim_start_matches('v');
    let current_trimmed = current.trim().trim_start_matches('v');
    match (
        semver::Version::parse(target_trimmed),
        semver::Version::parse(current_trimmed),
    ) {
        (Ok(t), Ok(c)) => t > c,
        _ => target_trimmed != current_trimmed,
    }
}

/// Atomically replace `exe_path` with `binary`.
///
/// Writes `<exe>.new`, renames the current executable to `<exe>.bak`, then
/// renames `.new` into place. A failed final rename rolls the backup back;
/// the backup is removed only after the swap succeeded.
///
/// # Errors
///
/// Returns an error on any I/O failure; the original executable is restored
/// or untouched in every failure path.
pub fn apply_binary(exe_path: &Path, binary: &[u8]) -> Result<()> {
    let new_path = with_suffix(exe_path, ".new");
    let backup_path = with_suffix(exe_path, ".bak");

    fs::write(&new_path, binary)
        .with_context(|| format!("writing {}", new_path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&new_path, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("setting permissions on {}", new_path.display()))?;
    }

    if let Err(err) = fs::rename(exe_path, &backup_path) {
        let _ = fs::remove_file(&new_path);
        return Err(err)
            .with_context(|| format!("moving current executable to {}", backup_path.display()));
    }
    if let Err(err) = fs::rename(&new_path, exe_path) {
        let _ = fs::rename(&backup_path, exe_path);
        let _ = fs::remove_file(&new_path);
        return Err(err).with_context(|| format!("installing {}", exe_path.display()));
    }
    let _ = fs::remove_file(&backup_path);
    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    std::path::PathBuf::from(name)
}

// ── Minisign verification ─────────────────────────────────────────────────────

/// Detached minisign signature verification over ed25519.
///
/// Supports the legacy `Ed` algorithm (signature over the raw content).
/// Prehashed `ED` signatures are rejected explicitly rather than
/// misverified.
mod minisign {
    use anyhow::Result;
    use ed25519_dalek::{Signature, Verifier as _, VerifyingKey};

    use crate::domain::error::UpdateError;

    /// Verify `signature_text` (the `.minisig` file contents) over `data`
    /// with `public_key_b64` (the base64 body of a minisign public key).
    pub fn verify(public_key_b64: &str, signature_text: &str, data: &[u8]) -> Result<()> {
        let key_blob = base64_decode(public_key_b64)
            .map_err(|e| UpdateError::SignatureInvalid(format!("bad public key: {e}")))?;
        if key_blob.len() != 42 || &key_blob[0..2] != b"Ed" {
            return Err(
                UpdateError::SignatureInvalid("public key is not a minisign Ed key".into()).into(),
            );
        }
        let key_id = &key_blob[2..10];
        let key_bytes: [u8; 32] = key_blob[10..42]
            .try_into()
            .map_err(|_| UpdateError::SignatureInvalid("public key truncated".into()))?;
        let verifying_key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| UpdateError::SignatureInvalid(format!("bad public key: {e}")))?;

        // Envelope: untrusted comment line, then the base64 signature blob.
        let sig_line = signature_text
            .lines()
            .find(|l| !l.trim().is_empty() && !l.starts_with("untrusted comment:"))
            .ok_or_else(|| UpdateError::SignatureInvalid("empty signature file".into()))?;
        let sig_blob = base64_decode(sig_line.trim())
            .map_err(|e| UpdateError::SignatureInvalid(format!("bad signature: {e}")))?;
        if sig_blob.len() != 74 {
            return Err(
                UpdateError::SignatureInvalid("signature blob has wrong length".into()).into(),
            );
        }
        match &sig_blob[0..2] {
            b"Ed" => {}
            b"ED" => {
                return Err(UpdateError::SignatureInvalid(
                    "prehashed (ED) minisign signatures are not supported".into(),
                )
                .into());
            }
            _ => {
                return Err(
                    UpdateError::SignatureInvalid("unknown signature algorithm".into()).into(),
                );
            }
        }
        if &sig_blob[2..10] != key_id {
            return Err(UpdateError::SignatureInvalid(
                "signature was made with a different key".into(),
            )
            .into());
        }

        let signature = Signature::from_slice(&sig_blob[10..74])
            .map_err(|e| UpdateError::SignatureInvalid(format!("bad signature: {e}")))?;
        verifying_key
            .verify(data, &signature)
            .map_err(|_| UpdateError::SignatureInvalid("ed25519 verification failed".into()))?;
        Ok(())
    }

    /// Minimal base64 decoder (standard alphabet, no padding required).
    pub fn base64_decode(input: &str) -> Result<Vec<u8>> {
        const ALPHABET: &[u8] =
            b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

        fn decode_char(c: u8) -> Option<u8> {
            #[allow(clippy::cast_possible_truncation)]
            ALPHABET.iter().position(|&x| x == c).map(|p| p as u8)
        }

        let input = input.trim_end_matches('=');
        let mut output = Vec::with_capacity(input.len() * 3 / 4);
        let mut buf = 0u32;
        let mut bits = 0u8;

        for &byte in input.as_bytes() {
            let val =
                decode_char(byte).ok_or_else(|| anyhow::anyhow!("invalid base64 character"))?;
            buf = (buf << 6) | u32::from(val);
            bits += 6;
            if bits >= 8 {
                bits -= 8;
                #[allow(clippy::cast_possible_truncation)]
                output.push((buf >> bits) as u8);
            }
        }

        Ok(output)
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
