//! `outpost list` — list registered instances.

use anyhow::Result;

use crate::app::AppContext;
use crate::application::services::lifecycle::InstanceService;

/// Run `outpost list`.
///
/// # Errors
///
/// Returns an error on registry I/O failure.
pub fn run(app: &AppContext) -> Result<()> {
    let service = InstanceService::new(&app.settings, &app.output);
    let entries = service.list()?;
    if entries.is_empty() {
        println!("no instances");
        return Ok(());
    }
    for entry in entries {
        println!("{}\t{}\t{}", entry.display_name, entry.status, entry.id);
    }
    Ok(())
}
