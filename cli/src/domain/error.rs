//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use thiserror::Error;

// ── Instance errors ───────────────────────────────────────────────────────────

/// Errors related to instance lifecycle and identity.
#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("Instance '{name}' is not installed. Run 'outpost install {name}' first.")]
    NotInstalled { name: String },

    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: String, to: String },

    #[error("unknown instance state: {0:?}")]
    UnknownState(String),

    #[error("instance log not found for '{0}'")]
    LogNotFound(String),
}

// ── Lock errors ───────────────────────────────────────────────────────────────

/// Errors related to the cross-process file lock.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out waiting for lock {path}")]
    Timeout { path: String },
}

// ── Registry errors ───────────────────────────────────────────────────────────

/// Errors related to the shared instance index.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry entry is incomplete: id, display name and path must be non-empty")]
    IncompleteEntry,
}

// ── Self-update errors ────────────────────────────────────────────────────────

/// Errors related to self-update integrity.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("checksum mismatch for {asset}: want={want} have={have}")]
    ChecksumMismatch {
        asset: String,
        want: String,
        have: String,
    },

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("signature required but updater.minisign_public_key is empty")]
    SignatureRequired,

    #[error("unsupported platform: {os}-{arch}")]
    UnsupportedPlatform { os: String, arch: String },
}

// ── Release manifest errors ───────────────────────────────────────────────────

/// Errors produced while parsing a release manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("invalid manifest line {0}")]
    InvalidLine(usize),

    #[error("invalid asset key: {0}")]
    InvalidAssetKey(String),

    #[error("unsupported asset namespace: {0}")]
    UnsupportedNamespace(String),

    #[error("invalid asset field in key: {0}")]
    InvalidAssetField(String),

    #[error("manifest missing version")]
    MissingVersion,

    #[error("manifest has no assets")]
    NoAssets,

    #[error("manifest asset {0} incomplete")]
    IncompleteAsset(String),

    #[error("manifest missing asset for {0}")]
    MissingPlatformAsset(String),
}

// ── Module errors ─────────────────────────────────────────────────────────────

/// Errors related to module resolution and installation.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("module '{0}' not found in configured catalogs")]
    NotFound(String),

    #[error("module name is empty")]
    EmptyName,

    #[error("module '{0}' has no install steps")]
    NoSteps(String),

    #[error("module '{0}' has invalid step with empty command")]
    EmptyStepCommand(String),

    #[error("module '{module}' install failed at step '{step}': {reason}")]
    StepFailed {
        module: String,
        step: String,
        reason: String,
    },
}
