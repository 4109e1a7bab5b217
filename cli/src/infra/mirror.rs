//! Download mirror resolution with ordered probing and direct fallback.
//!
//! Candidates are probed in order against a health-check URL; the first one
//! answering 2xx wins. An empty selection means "use the origin directly" —
//! it is a fallback, never a failure.

use std::io::Read as _;
use std::time::Duration;

use crate::application::ports::Reporter;

/// Built-in candidate prefixes used when the configured list is empty.
pub const DEFAULT_MIRRORS: [&str; 3] = [
    "https://ghfast.top",
    "https://gh-proxy.com",
    "https://github.moeyy.xyz",
];

/// Bytes of the probe body read before discarding the connection.
const PROBE_DISCARD_BYTES: u64 = 256;

/// Probes an ordered mirror candidate list.
pub struct MirrorResolver {
    candidates: Vec<String>,
    probe_url: String,
    timeout: Duration,
}

/// Outcome of a resolution: the selected prefix (when any candidate
/// answered) and the full candidate list for diagnostics.
#[derive(Debug, Clone)]
pub struct MirrorSelection {
    pub prefix: Option<String>,
    pub candidates: Vec<String>,
}

impl MirrorSelection {
    /// Comma-joined candidate list, as injected into step environments.
    #[must_use]
    pub fn candidates_joined(&self) -> String {
        self.candidates.join(",")
    }
}

impl MirrorResolver {
    /// Build a resolver from configuration. An empty candidate list falls
    /// back to [`DEFAULT_MIRRORS`]; a zero timeout falls back to 8 seconds.
    #[must_use]
    pub fn new(mirrors: &[String], probe_url: &str, timeout_seconds: u64) -> Self {
        let mut candidates = normalize_mirrors(mirrors);
        if candidates.is_empty() {
            candidates = DEFAULT_MIRRORS.iter().map(ToString::to_string).collect();
        }
        let timeout = if timeout_seconds == 0 {
            Duration::from_secs(8)
        } else {
            Duration::from_secs(timeout_seconds)
        };
        Self {
            candidates,
            probe_url: probe_url.trim().to_string(),
            timeout,
        }
    }

    /// Probe candidates in order and select the first reachable one.
    ///
    /// With no probe URL the selection is empty (direct access). When every
    /// probe fails the selection is also empty; the caller must treat that
    /// as "use origin directly", not as an error.
    pub fn resolve(&self, reporter: &dyn Reporter) -> MirrorSelection {
        if self.probe_url.is_empty() || self.candidates.is_empty() {
            return MirrorSelection {
                prefix: None,
                candidates: self.candidates.clone(),
            };
        }

        for prefix in &self.candidates {
            if self.probe(prefix) {
                reporter.info(&format!("download mirror selected: {prefix}"));
                return MirrorSelection {
                    prefix: Some(prefix.clone()),
                    candidates: self.candidates.clone(),
                };
            }
            reporter.warn(&format!("download mirror probe failed: {prefix}"));
        }
        reporter.warn("all download mirrors failed their probe, falling back to direct");
        MirrorSelection {
            prefix: None,
            candidates: self.candidates.clone(),
        }
    }

    fn probe(&self, prefix: &str) -> bool {
        let url = combine(prefix, &self.probe_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(self.timeout)
            .user_agent(crate::infra::http::USER_AGENT)
            .build();
        match agent.get(&url).call() {
            Ok(response) => {
                let mut sink = Vec::new();
                let _ = response
                    .into_reader()
                    .take(PROBE_DISCARD_BYTES)
                    .read_to_end(&mut sink);
                true
            }
            Err(_) => false,
        }
    }
}

/// Trim, drop empties, de-duplicate, and strip trailing slashes.
fn normalize_mirrors(mirrors: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    mirrors
        .iter()
        .filter_map(|raw| {
            let trimmed = raw.trim().trim_end_matches('/').to_string();
            if trimmed.is_empty() || !seen.insert(trimmed.clone()) {
                None
            } else {
                Some(trimmed)
            }
        })
        .collect()
}

/// Join a mirror prefix and a probe URL, stripping the URL's scheme first.
fn combine(prefix: &str, url: &str) -> String {
    let prefix = prefix.trim().trim_end_matches('/');
    let url = url.trim();
    if prefix.is_empty() {
        return url.to_string();
    }
    if url.is_empty() {
        return prefix.to_string();
    }
    let stripped = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    format!("{prefix}/{stripped}")
}

// ── Unit tests ────────────────────────────────────────────────────────────────
