//! `outpost delete` — remove an instance workspace.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::lifecycle::InstanceService;

/// Arguments for the delete command.
#[derive(Args, Default)]
pub struct DeleteArgs {
    /// Instance name or ID (defaults to "main")
    pub name: Option<String>,
}

/// Run `outpost delete [name]`.
///
/// Stops a live worker, removes the instance directory, the registry entry,
/// and the instance's lock marker.
///
/// # Errors
///
/// Returns an error on I/O failure or a declined confirmation.
pub fn run(args: &DeleteArgs, app: &AppContext) -> Result<()> {
    let service = InstanceService::new(&app.settings, &app.output);
    let target = service.resolve_target(args.name.as_deref().unwrap_or_default())?;

    let confirmed = app.non_interactive
        || app.confirm(
            &format!("Delete instance '{}' and all its data?", target.display_name),
            false,
        )?;
    if !confirmed {
        anyhow::bail!("operation cancelled");
    }
    service.delete(args.name.as_deref().unwrap_or_default())
}
