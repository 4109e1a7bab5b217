//! Application context — unified state passed to every command handler.
//!
//! Constructed once in `Cli::run()` and passed as `&AppContext` to all
//! command handlers: settings are loaded (and migrated) exactly once per
//! invocation, and output flags live in one place.

use anyhow::Result;

use crate::domain::settings::Settings;
use crate::infra::settings::SettingsStore;
use crate::output::OutputContext;

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Loaded, migrated, and normalized settings.
    pub settings: Settings,
    /// When `true`, skip interactive prompts and use defaults.
    ///
    /// Set when `--yes` / `-y` is passed, or when the `CI` or `OUTPOST_YES`
    /// environment variables are present.
    pub non_interactive: bool,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    ///
    /// # Errors
    ///
    /// Returns an error when the data home cannot be resolved or the
    /// settings file is malformed.
    pub fn new(no_color: bool, quiet: bool, yes: bool) -> Result<Self> {
        let ci_env = std::env::var("CI").is_ok() || std::env::var("OUTPOST_YES").is_ok();
        let settings = SettingsStore::new()?.load_or_create()?;
        Ok(Self {
            output: OutputContext::new(no_color, quiet),
            settings,
            non_interactive: yes || ci_env,
        })
    }

    /// Ask the user for confirmation.
    ///
    /// When `non_interactive` is `true` (CI, `--yes` flag, or `OUTPOST_YES`
    /// env), returns `default` immediately without prompting.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails (e.g. no TTY).
    pub fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.non_interactive {
            return Ok(default);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(confirmed)
    }
}
