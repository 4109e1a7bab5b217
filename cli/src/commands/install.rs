//! `outpost install` — create an instance workspace.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::Reporter as _;
use crate::application::services::lifecycle::InstanceService;

/// Arguments for the install command.
#[derive(Args, Default)]
pub struct InstallArgs {
    /// Instance name (defaults to "main")
    pub name: Option<String>,
}

/// Run `outpost install [name]`.
///
/// # Errors
///
/// Returns an error on lock contention, an invalid transition, or I/O
/// failure.
pub fn run(args: &InstallArgs, app: &AppContext) -> Result<()> {
    let service = InstanceService::new(&app.settings, &app.output);
    let target = service.install(args.name.as_deref().unwrap_or_default())?;
    app.output
        .success(&format!("instance '{}' installed", target.display_name));
    Ok(())
}
