//! `outpost restart` — stop then start the instance worker.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::Reporter as _;
use crate::application::services::lifecycle::{InstanceService, StartOutcome};
use crate::infra::worker::DetachedWorkerSpawner;

/// Arguments for the restart command.
#[derive(Args, Default)]
pub struct RestartArgs {
    /// Instance name or ID (defaults to "main")
    pub name: Option<String>,
}

/// Run `outpost restart [name]`.
///
/// # Errors
///
/// Propagates the first failing half of the stop/start pair.
pub fn run(args: &RestartArgs, app: &AppContext) -> Result<()> {
    let service = InstanceService::new(&app.settings, &app.output);
    let outcome = service.restart(
        args.name.as_deref().unwrap_or_default(),
        &DetachedWorkerSpawner,
    )?;
    if let StartOutcome::Started { pid } = outcome {
        app.output
            .success(&format!("instance restarted (pid {pid})"));
    }
    Ok(())
}
