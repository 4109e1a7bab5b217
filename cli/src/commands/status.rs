//! `outpost status` — report the instance's effective state.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::lifecycle::InstanceService;

/// Arguments for the status command.
#[derive(Args, Default)]
pub struct StatusArgs {
    /// Instance name or ID (defaults to "main")
    pub name: Option<String>,
}

/// Run `outpost status [name]`.
///
/// Output is stable `key=value` lines so scripts can parse it.
///
/// # Errors
///
/// Returns an error when the instance is not installed.
pub fn run(args: &StatusArgs, app: &AppContext) -> Result<()> {
    let service = InstanceService::new(&app.settings, &app.output);
    let view = service.status(args.name.as_deref().unwrap_or_default())?;

    println!("name={}", view.display_name);
    println!("id={}", view.id);
    println!("state={}", view.state);
    println!("pid={}", view.pid);
    println!("updated_at={}", view.updated_at.to_rfc3339());
    Ok(())
}
