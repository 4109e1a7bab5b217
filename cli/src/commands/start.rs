//! `outpost start` — start the instance worker.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::Reporter as _;
use crate::application::services::lifecycle::{InstanceService, StartOutcome};
use crate::infra::worker::DetachedWorkerSpawner;

/// Arguments for the start command.
#[derive(Args, Default)]
pub struct StartArgs {
    /// Instance name or ID (defaults to "main")
    pub name: Option<String>,
}

/// Run `outpost start [name]`.
///
/// # Errors
///
/// Returns an error when the instance is not installed, the transition is
/// invalid, or spawning fails.
pub fn run(args: &StartArgs, app: &AppContext) -> Result<()> {
    let service = InstanceService::new(&app.settings, &app.output);
    let outcome = service.start(
        args.name.as_deref().unwrap_or_default(),
        &DetachedWorkerSpawner,
    )?;
    match outcome {
        StartOutcome::AlreadyRunning { pid } => {
            app.output.info(&format!("already running (pid {pid})"));
        }
        StartOutcome::Started { pid } => {
            app.output.success(&format!("instance started (pid {pid})"));
        }
    }
    Ok(())
}
