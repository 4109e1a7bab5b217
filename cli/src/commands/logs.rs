//! `outpost logs` — tail the instance log.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::lifecycle::InstanceService;

/// Arguments for the logs command.
#[derive(Args, Default)]
pub struct LogsArgs {
    /// Instance name or ID (defaults to "main")
    pub name: Option<String>,

    /// Number of lines to show from the end of the log
    #[arg(long, default_value_t = 50)]
    pub tail: usize,
}

/// Run `outpost logs [name] [--tail N]`.
///
/// # Errors
///
/// Returns an error when the instance log does not exist.
pub fn run(args: &LogsArgs, app: &AppContext) -> Result<()> {
    let service = InstanceService::new(&app.settings, &app.output);
    for line in service.logs(args.name.as_deref().unwrap_or_default(), args.tail)? {
        println!("{line}");
    }
    Ok(())
}
