//! `outpost modules` — list and install modules from the configured
//! catalogs.

use anyhow::Result;
use clap::Subcommand;

use crate::app::AppContext;
use crate::application::ports::Reporter as _;
use crate::application::services::module_install::ModuleInstaller;
use crate::infra::executor::TerminalStepExecutor;

/// Subcommands for `outpost modules`.
#[derive(Subcommand)]
pub enum ModulesCommand {
    /// List available modules
    #[command(alias = "ls")]
    List,

    /// Install a module by name
    Install {
        /// Module name as listed by `outpost modules list`
        name: String,
    },
}

/// Run `outpost modules <list|install>`.
///
/// # Errors
///
/// Returns an error when the module is unknown or a step exhausts its
/// retries.
pub async fn run(command: ModulesCommand, app: &AppContext) -> Result<()> {
    let installer = ModuleInstaller::new(&app.settings.modules, &app.settings.mirrors, &app.output);
    match command {
        ModulesCommand::List => {
            for def in installer.list() {
                let description = def.description.trim();
                let description = if description.is_empty() {
                    "(no description)"
                } else {
                    description
                };
                println!("{}\t{description}", def.name);
            }
            Ok(())
        }
        ModulesCommand::Install { name } => {
            let executor = TerminalStepExecutor::new(app.non_interactive);
            let report = installer.install(&executor, &name).await?;
            app.output.success(&format!(
                "module '{}' installed from {} ({} attempts)",
                report.module,
                report.source,
                report.attempts.len()
            ));
            Ok(())
        }
    }
}
