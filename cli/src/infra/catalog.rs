//! Module catalog providers.
//!
//! Providers are a closed variant set: the builtin static catalog and remote
//! HTTP catalogs. New kinds of catalogs are added as new variants, never by
//! type inspection. The remote contract is a GET returning either
//! `{"modules":[...]}` or a bare array of module definitions.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::module::{ModuleDefinition, ModuleStep};
use crate::domain::settings::ModuleSettings;
use crate::infra::http;

/// One source of module definitions.
pub enum CatalogProvider {
    /// Compiled-in catalog, always available.
    Builtin,
    /// Remote JSON catalog.
    Http { url: String, timeout: Duration },
}

impl CatalogProvider {
    /// Stable provider name used in reports and logs.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            CatalogProvider::Builtin => "builtin".to_string(),
            CatalogProvider::Http { url, .. } => format!("http:{url}"),
        }
    }

    /// Fetch this provider's definitions.
    ///
    /// # Errors
    ///
    /// Returns an error when a remote catalog is unreachable or malformed.
    /// The builtin catalog never fails.
    pub fn list(&self) -> Result<Vec<ModuleDefinition>> {
        match self {
            CatalogProvider::Builtin => Ok(builtin_definitions()),
            CatalogProvider::Http { url, timeout } => {
                let body = http::fetch(url, *timeout)
                    .with_context(|| format!("fetching catalog {url}"))?;
                parse_catalog(&body).with_context(|| format!("parsing catalog {url}"))
            }
        }
    }
}

/// Build the ordered provider list from settings: builtin first, then remote
/// catalogs, rotated when remote catalogs are preferred.
#[must_use]
pub fn build_providers(settings: &ModuleSettings) -> Vec<CatalogProvider> {
    let timeout = Duration::from_secs(settings.catalog_timeout_seconds.max(1));
    let mut providers = vec![CatalogProvider::Builtin];
    for url in &settings.catalog_urls {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            continue;
        }
        providers.push(CatalogProvider::Http {
            url: trimmed.to_string(),
            timeout,
        });
    }
    if settings.prefer_catalog_source && providers.len() > 1 {
        providers.rotate_left(1);
    }
    providers
}

fn parse_catalog(body: &[u8]) -> Result<Vec<ModuleDefinition>> {
    #[derive(Deserialize)]
    struct Wrapped {
        #[serde(default)]
        modules: Vec<ModuleDefinition>,
    }

    if let Ok(wrapped) = serde_json::from_slice::<Wrapped>(body) {
        if !wrapped.modules.is_empty() {
            return Ok(wrapped.modules);
        }
    }
    serde_json::from_slice::<Vec<ModuleDefinition>>(body)
        .context("catalog is neither {\"modules\":[...]} nor a bare array")
}

// ── Builtin catalog ───────────────────────────────────────────────────────────

/// Compiled-in module definitions.
#[must_use]
pub fn builtin_definitions() -> Vec<ModuleDefinition> {
    vec![
        ModuleDefinition {
            name: "agent-bundle".to_string(),
            description: "Download and unpack the agent runtime bundle into the workspace"
                .to_string(),
            install: vec![
                ModuleStep {
                    name: "prepare workspace directories".to_string(),
                    command: "bash".to_string(),
                    args: vec![
                        "-lc".to_string(),
                        r#"set -euo pipefail
INSTALL_DIR="$PWD/modules/agent-bundle"
mkdir -p "$INSTALL_DIR" "$INSTALL_DIR/tmp"
echo "agent bundle install dir: $INSTALL_DIR""#
                            .to_string(),
                    ],
                    ..ModuleStep::default()
                },
                ModuleStep {
                    name: "install system dependencies".to_string(),
                    command: "bash".to_string(),
                    require_sudo: true,
                    sensitive: true,
                    prompt: "Install system dependencies for the agent bundle?".to_string(),
                    args: vec![
                        "-lc".to_string(),
                        r#"set -euo pipefail
if command -v apt-get >/dev/null 2>&1; then
  DEBIAN_FRONTEND=noninteractive apt-get update -y -qq
  DEBIAN_FRONTEND=noninteractive apt-get install -y -qq zip unzip jq curl procps
elif command -v dnf >/dev/null 2>&1; then
  dnf install -y zip unzip jq curl procps-ng
else
  echo "Unsupported package manager. Only apt-get/dnf are supported." >&2
  exit 1
fi"#
                        .to_string(),
                    ],
                },
                ModuleStep {
                    name: "download and unpack bundle".to_string(),
                    command: "bash".to_string(),
                    args: vec![
                        "-lc".to_string(),
                        r#"set -euo pipefail
INSTALL_DIR="$PWD/modules/agent-bundle"
cd "$INSTALL_DIR"
ZIP_FILE="agent-bundle.zip"
target_proxy="${OUTPOST_PROXY_PREFIX:-}"

if [ -f "$ZIP_FILE" ]; then
  echo "reuse existing $ZIP_FILE"
else
  direct_url="https://github.com/OutpostLabsHQ/outpost-agent/releases/latest/download/agent-bundle.zip"
  if [ -n "$target_proxy" ]; then
    mirror_url="${target_proxy}/${direct_url#https://}"
    curl -L -f "$mirror_url" -o "$ZIP_FILE" || curl -L -f "$direct_url" -o "$ZIP_FILE"
  else
    curl -L -f "$direct_url" -o "$ZIP_FILE"
  fi
fi

unzip -t "$ZIP_FILE" >/dev/null
unzip -q -o "$ZIP_FILE" -d "$INSTALL_DIR""#
                            .to_string(),
                    ],
                    ..ModuleStep::default()
                },
                ModuleStep {
                    name: "write launcher script".to_string(),
                    command: "bash".to_string(),
                    args: vec![
                        "-lc".to_string(),
                        r#"set -euo pipefail
INSTALL_DIR="$PWD/modules/agent-bundle"
cd "$INSTALL_DIR"
cat > launcher.sh <<'EOF'
#!/bin/bash
exec ./agent --workdir "$(pwd)"
EOF
chmod +x launcher.sh
echo "agent bundle installed. Start with: cd $INSTALL_DIR && ./launcher.sh""#
                            .to_string(),
                    ],
                    ..ModuleStep::default()
                },
            ],
        },
        ModuleDefinition {
            name: "adapter-example".to_string(),
            description: "Built-in adapter installer example".to_string(),
            install: vec![ModuleStep {
                name: "install adapter".to_string(),
                command: "bash".to_string(),
                args: vec![
                    "-lc".to_string(),
                    "echo 'example adapter installed'".to_string(),
                ],
                ..ModuleStep::default()
            }],
        },
    ]
}

// ── Unit tests ────────────────────────────────────────────────────────────────
