//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::AppContext;
use crate::commands;

/// Local instance manager for deployable agent binaries
#[derive(Parser)]
#[command(
    name = "outpost",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Skip interactive prompts and assume the default answer
    #[arg(short, long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an instance workspace
    Install(commands::install::InstallArgs),

    /// Start the instance worker
    Start(commands::start::StartArgs),

    /// Stop the instance worker (preserves state)
    Stop(commands::stop::StopArgs),

    /// Restart the instance worker
    Restart(commands::restart::RestartArgs),

    /// Show instance status
    Status(commands::status::StatusArgs),

    /// Show instance logs
    Logs(commands::logs::LogsArgs),

    /// List registered instances
    #[command(alias = "ls")]
    List,

    /// Remove an instance workspace
    Delete(commands::delete::DeleteArgs),

    /// Run the instance update round trip
    Update(commands::update::UpdateArgs),

    /// Update the outpost executable itself
    #[command(alias = "self-update")]
    Upgrade,

    /// Manage installable modules
    #[command(subcommand)]
    Modules(commands::modules::ModulesCommand),

    /// Clone a repository through the configured git mirrors
    Clone(commands::clone::CloneArgs),

    /// Show version
    Version,

    #[command(hide = true, name = "_worker")]
    Worker {
        id: String,
        display_name: String,
    },
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<()> {
        let Cli {
            quiet,
            no_color,
            yes,
            command,
        } = self;

        if let Command::Version = command {
            return commands::version::run();
        }

        let app = AppContext::new(no_color, quiet, yes)?;
        match command {
            Command::Install(args) => commands::install::run(&args, &app),
            Command::Start(args) => commands::start::run(&args, &app),
            Command::Stop(args) => commands::stop::run(&args, &app),
            Command::Restart(args) => commands::restart::run(&args, &app),
            Command::Status(args) => commands::status::run(&args, &app),
            Command::Logs(args) => commands::logs::run(&args, &app),
            Command::List => commands::list::run(&app),
            Command::Delete(args) => commands::delete::run(&args, &app),
            Command::Update(args) => commands::update::run(&args, &app),
            Command::Upgrade => commands::upgrade::run(&app),
            Command::Modules(command) => commands::modules::run(command, &app).await,
            Command::Clone(args) => commands::clone::run(&args, &app).await,
            Command::Worker { id, display_name } => {
                commands::internal::run_worker(&id, &display_name, &app).await
            }
            // Handled before the AppContext is built.
            Command::Version => Ok(()),
        }
    }
}
