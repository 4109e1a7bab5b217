//! Module catalog types and the install/clone audit trail.
//!
//! `ModuleDefinition` doubles as the wire schema for remote catalogs (a GET
//! returning `{"modules":[...]}` or a bare array). Reports are transient:
//! built incrementally during execution, returned to the caller, never
//! persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Catalog schema ────────────────────────────────────────────────────────────

/// One install step of a module recipe. Steps are opaque shell commands;
/// ordering is significant and steps run sequentially.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleStep {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub require_sudo: bool,
    /// Sensitive steps require interactive confirmation before running.
    pub sensitive: bool,
    pub prompt: String,
}

impl ModuleStep {
    /// Display name of the step: its configured name or, when unnamed,
    /// its command.
    #[must_use]
    pub fn display_name(&self) -> &str {
        let trimmed = self.name.trim();
        if trimmed.is_empty() {
            &self.command
        } else {
            trimmed
        }
    }
}

/// A named, ordered install recipe resolved from a catalog provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleDefinition {
    pub name: String,
    pub description: String,
    pub install: Vec<ModuleStep>,
}

// ── Audit trail ───────────────────────────────────────────────────────────────

/// One try of one install step.
#[derive(Debug, Clone, Serialize)]
pub struct InstallAttempt {
    pub step_name: String,
    pub command: String,
    pub args: Vec<String>,
    pub try_number: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub error: Option<String>,
}

/// Audit record of a whole module installation.
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub module: String,
    /// Name of the catalog provider the definition was resolved from.
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub success: bool,
    pub attempts: Vec<InstallAttempt>,
}

impl InstallReport {
    #[must_use]
    pub fn begin(module: &str, now: DateTime<Utc>) -> Self {
        Self {
            module: module.to_string(),
            source: String::new(),
            started_at: now,
            ended_at: now,
            success: false,
            attempts: Vec::new(),
        }
    }

    /// Attempt records for one step, in try order.
    #[must_use]
    pub fn attempts_for(&self, step_name: &str) -> Vec<&InstallAttempt> {
        self.attempts
            .iter()
            .filter(|a| a.step_name == step_name)
            .collect()
    }
}
