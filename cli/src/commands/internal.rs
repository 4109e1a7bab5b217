//! Hidden `_worker` subcommand — the detached instance worker process.
//!
//! The worker's stdout/stderr are redirected into the per-instance log by
//! the spawning parent, so plain `println!` lines land in `instance.log`.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;

use crate::app::AppContext;

/// Run the instance worker loop until the process is signaled.
///
/// # Errors
///
/// Never returns `Ok` in practice; the signature matches the other command
/// handlers so the dispatcher stays uniform.
pub async fn run_worker(id: &str, display_name: &str, app: &AppContext) -> Result<()> {
    let tick = Duration::from_secs(app.settings.installer.instance_tick_seconds.max(1));

    println!(
        "{} instance worker started: {display_name} ({id})",
        Utc::now().to_rfc3339()
    );
    let mut interval = tokio::time::interval(tick);
    interval.tick().await; // first tick fires immediately; skip it
    loop {
        interval.tick().await;
        println!(
            "{} heartbeat instance={display_name} id={id}",
            Utc::now().to_rfc3339()
        );
    }
}
