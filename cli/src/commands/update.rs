//! `outpost update` — run the instance update round trip.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::Reporter as _;
use crate::application::services::lifecycle::InstanceService;

/// Arguments for the update command.
#[derive(Args, Default)]
pub struct UpdateArgs {
    /// Instance name or ID (defaults to "main")
    pub name: Option<String>,
}

/// Run `outpost update [name]`.
///
/// # Errors
///
/// Returns an error when the instance is not installed or a transition is
/// invalid.
pub fn run(args: &UpdateArgs, app: &AppContext) -> Result<()> {
    let service = InstanceService::new(&app.settings, &app.output);
    service.update(args.name.as_deref().unwrap_or_default())?;
    app.output.success("instance updated");
    Ok(())
}
