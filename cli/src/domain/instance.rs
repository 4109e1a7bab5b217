//! Instance domain types: persisted record, status state machine, identity.
//!
//! This module is intentionally free of I/O, async, and external layer
//! imports. All functions take data in and return data out.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::error::InstanceError;

/// Schema version written into every `config.json`.
pub const RECORD_VERSION: u32 = 1;

/// Display name used when the caller supplies an empty reference.
pub const DEFAULT_INSTANCE_NAME: &str = "main";

// ── Status state machine ──────────────────────────────────────────────────────

/// Lifecycle status of an instance, persisted as a lowercase string.
///
/// The "no record yet" pseudo-state is modeled as `None` in
/// [`validate_transition`]; it has no serialized form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Installed,
    Running,
    Stopped,
    Updating,
    Failed,
}

impl Status {
    /// All recognized states, used by the transition-table tests.
    pub const ALL: [Status; 5] = [
        Status::Installed,
        Status::Running,
        Status::Stopped,
        Status::Updating,
        Status::Failed,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Installed => "installed",
            Status::Running => "running",
            Status::Stopped => "stopped",
            Status::Updating => "updating",
            Status::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = InstanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "installed" => Ok(Status::Installed),
            "running" => Ok(Status::Running),
            "stopped" => Ok(Status::Stopped),
            "updating" => Ok(Status::Updating),
            "failed" => Ok(Status::Failed),
            other => Err(InstanceError::UnknownState(other.to_string())),
        }
    }
}

/// Validates a status transition against the lifecycle table.
///
/// `None` is the "no record yet" pseudo-state and may only move to
/// `Installed`. `Updating` is the only state allowed to return to
/// `Installed`; `Failed` is recoverable.
///
/// # Errors
///
/// Returns [`InstanceError::InvalidTransition`] when the pair is absent
/// from the table.
pub fn validate_transition(from: Option<Status>, to: Status) -> Result<(), InstanceError> {
    use Status::{Failed, Installed, Running, Stopped, Updating};

    let allowed = match from {
        None => matches!(to, Installed),
        Some(Installed) => matches!(to, Installed | Running | Updating | Failed | Stopped),
        Some(Running) => matches!(to, Running | Stopped | Updating | Failed),
        Some(Stopped) => matches!(to, Stopped | Running | Updating | Failed),
        Some(Updating) => matches!(to, Updating | Installed | Running | Stopped | Failed),
        Some(Failed) => matches!(to, Failed | Installed | Updating | Stopped),
    };

    if allowed {
        Ok(())
    } else {
        Err(InstanceError::InvalidTransition {
            from: from.map(Status::as_str).unwrap_or_default().to_string(),
            to: to.as_str().to_string(),
        })
    }
}

// ── Persisted record ──────────────────────────────────────────────────────────

/// Instance state persisted to `<instance dir>/config.json`.
///
/// Owned exclusively by the lifecycle service for that instance; the shared
/// registry holds a denormalized projection of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Record schema version.
    pub version: u32,
    /// Stable identifier, derived from the normalized display name.
    pub id: String,
    /// Human-supplied display name.
    pub display_name: String,
    /// When the instance was installed.
    pub created_at: DateTime<Utc>,
    /// When the record was last re-written.
    pub updated_at: DateTime<Utc>,
    /// Lifecycle status.
    pub status: Status,
    /// OS process ID of the worker, `0` when not running.
    #[serde(default)]
    pub pid: i32,
}

impl InstanceRecord {
    /// Create a freshly installed record for `name` at time `now`.
    #[must_use]
    pub fn new(name: &str, now: DateTime<Utc>) -> Self {
        let display_name = normalize_name(name);
        let id = instance_id(&display_name);
        Self {
            version: RECORD_VERSION,
            id,
            display_name,
            created_at: now,
            updated_at: now,
            status: Status::Installed,
            pid: 0,
        }
    }
}

// ── Identity ──────────────────────────────────────────────────────────────────

/// Normalize a human-supplied instance reference.
///
/// Whitespace is trimmed; an empty reference resolves to the default name.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        DEFAULT_INSTANCE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Derive the stable instance ID from a display name.
///
/// The ID is a pure function of the normalized name (SHA-256, lowercase
/// hex), so re-resolving the same name always yields the same ID without
/// a registry lookup.
#[must_use]
pub fn instance_id(name: &str) -> String {
    let digest = Sha256::digest(normalize_name(name).as_bytes());
    hex_encode(&digest)
}

/// Returns `true` when `v` already has the shape of a derived ID
/// (64 lowercase hex characters).
#[must_use]
pub fn is_hex_id(v: &str) -> bool {
    v.len() == 64 && v.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Encode bytes as lowercase hex string.
///
/// Pure utility shared by ID derivation and update checksum verification.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(char::from(HEX[(b >> 4) as usize]));
        out.push(char::from(HEX[(b & 0xf) as usize]));
    }
    out
}

// ── Unit tests ────────────────────────────────────────────────────────────────
