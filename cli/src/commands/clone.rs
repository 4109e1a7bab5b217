//! `outpost clone` — fetch a repository through the mirror-aware git source
//! list.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::Reporter as _;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::gitops::GitSourceManager;

/// Arguments for the clone command.
#[derive(Args)]
pub struct CloneArgs {
    /// Repository URL to clone
    pub url: String,

    /// Destination directory (defaults to the repo name in the instance
    /// data home)
    pub dest: Option<PathBuf>,

    /// Pull (fast-forward only) instead of cloning when dest already exists
    #[arg(long)]
    pub pull: bool,
}

/// Run `outpost clone <url> [dest] [--pull]`.
///
/// # Errors
///
/// Returns an error when every source exhausts its retries.
pub async fn run(args: &CloneArgs, app: &AppContext) -> Result<()> {
    let manager = GitSourceManager::new(app.settings.git.clone(), TokioCommandRunner);
    let dest = match &args.dest {
        Some(dest) => dest.clone(),
        None => default_dest(app, &args.url)?,
    };

    let report = if args.pull && dest.join(".git").is_dir() {
        manager.pull(&dest, &app.output).await?
    } else {
        manager.clone_repo(&args.url, &dest, &app.output).await?
    };

    if let Some(source) = &report.used_source {
        app.output.info(&format!(
            "fetched via {} in {} attempt(s)",
            source.name,
            report.attempts.len()
        ));
    }
    Ok(())
}

fn default_dest(app: &AppContext, url: &str) -> Result<PathBuf> {
    let name = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(|n| n.trim_end_matches(".git"))
        .filter(|n| !n.is_empty())
        .unwrap_or("repo");
    // Checkouts live next to the instances, inside the data home.
    Ok(PathBuf::from(app.settings.installer.data_home.trim())
        .join("repos")
        .join(name))
}
