//! `outpost stop` — stop the instance worker (preserves state).

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::Reporter as _;
use crate::application::services::lifecycle::InstanceService;

/// Arguments for the stop command.
#[derive(Args, Default)]
pub struct StopArgs {
    /// Instance name or ID (defaults to "main")
    pub name: Option<String>,
}

/// Run `outpost stop [name]`.
///
/// # Errors
///
/// Returns an error when the instance is not installed, the transition is
/// invalid, or the worker cannot be signaled.
pub fn run(args: &StopArgs, app: &AppContext) -> Result<()> {
    let service = InstanceService::new(&app.settings, &app.output);
    service.stop(args.name.as_deref().unwrap_or_default())?;
    app.output.success("instance stopped");
    Ok(())
}
