//! `outpost upgrade` — self-update with checksum and signature verification.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::app::AppContext;
use crate::application::ports::Reporter as _;
use crate::application::services::self_update::{SelfUpdater, UpdateOutcome};
use crate::infra::http::HttpReleaseFetcher;

/// Run `outpost upgrade`.
///
/// Fetches the release manifest for the configured channel, verifies the
/// platform asset's checksum and signature, and atomically replaces the
/// current executable.
///
/// # Errors
///
/// Returns an error on network failure, an integrity failure, or a failed
/// swap.
pub fn run(app: &AppContext) -> Result<()> {
    let current = env!("CARGO_PKG_VERSION");
    let exe_path = std::env::current_exe().context("resolving current executable")?;

    let spinner = if app.output.show_progress() {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message("Checking for updates...");
        bar.enable_steady_tick(std::time::Duration::from_millis(120));
        Some(bar)
    } else {
        None
    };

    let updater = SelfUpdater::new(&app.settings, &HttpReleaseFetcher, &app.output);
    let outcome = updater.run(current, &exe_path);
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }

    match outcome? {
        UpdateOutcome::UpToDate { version } => {
            app.output.success(&format!("outpost v{version} (latest)"));
        }
        UpdateOutcome::Updated { from, to } => {
            app.output
                .success(&format!("outpost updated v{from} -> v{to}"));
            app.output.info("restart your terminal or run: exec outpost");
        }
    }
    Ok(())
}
