//! HTTP fetch helper for release artifacts and catalogs.
//!
//! Blocking `ureq` requests with a fixed user agent and bounded timeouts.
//! Error bodies are read with a small cap so a misbehaving server cannot
//! balloon an error message.

use std::io::Read as _;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::ReleaseFetcher;

/// User agent sent with every request.
pub const USER_AGENT: &str = "outpost-cli";

/// Timeout applied to release-artifact requests.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(45);

/// Cap on downloaded artifact size.
const MAX_BODY_BYTES: u64 = 512 * 1024 * 1024;

/// GET `url` and return the body, failing on non-2xx statuses.
///
/// # Errors
///
/// Returns an error on transport failure, a non-2xx status (including the
/// first kilobyte of the error body), or a body exceeding the size cap.
pub fn fetch(url: &str, timeout: Duration) -> Result<Vec<u8>> {
    let agent = ureq::AgentBuilder::new()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build();

    let response = match agent.get(url).call() {
        Ok(response) => response,
        Err(ureq::Error::Status(code, response)) => {
            let mut body = String::new();
            let _ = response
                .into_reader()
                .take(1024)
                .read_to_string(&mut body);
            anyhow::bail!("request failed {url}: status {code} - {}", body.trim());
        }
        Err(err) => return Err(err).with_context(|| format!("request failed {url}")),
    };

    let mut data = Vec::new();
    response
        .into_reader()
        .take(MAX_BODY_BYTES)
        .read_to_end(&mut data)
        .with_context(|| format!("reading response body from {url}"))?;
    Ok(data)
}

/// Production [`ReleaseFetcher`] over [`fetch`] with the standard timeout.
pub struct HttpReleaseFetcher;

impl ReleaseFetcher for HttpReleaseFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        fetch(url, FETCH_TIMEOUT)
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
