//! Production step executor: terminal-inherited command execution with
//! confirmation prompts and sudo escalation.

use std::process::Stdio;

use anyhow::{Context, Result};
use dialoguer::Confirm;

use crate::application::ports::{ExecOptions, StepExecutor};

/// Runs module install steps on the host terminal.
pub struct TerminalStepExecutor {
    /// When `true`, sensitive steps are confirmed automatically
    /// (`--yes`, `CI`, or `OUTPOST_YES`).
    non_interactive: bool,
}

impl TerminalStepExecutor {
    #[must_use]
    pub fn new(non_interactive: bool) -> Self {
        Self { non_interactive }
    }

    fn confirm(&self, prompt: &str) -> Result<bool> {
        if self.non_interactive {
            return Ok(true);
        }
        let text = prompt.trim();
        let text = if text.is_empty() {
            "Sensitive operation. Continue?"
        } else {
            text
        };
        Confirm::new()
            .with_prompt(text)
            .default(false)
            .interact()
            .context("reading confirmation")
    }

    async fn exec(&self, program: &str, args: &[String], opts: &ExecOptions) -> Result<()> {
        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        for (key, value) in sorted_env(opts) {
            command.env(key, value);
        }

        let status = command
            .status()
            .await
            .with_context(|| format!("failed to spawn {program}"))?;
        if status.success() {
            Ok(())
        } else {
            anyhow::bail!("{program} exited with {status}")
        }
    }

    #[cfg(unix)]
    async fn exec_with_sudo(
        &self,
        program: &str,
        args: &[String],
        opts: &ExecOptions,
    ) -> Result<()> {
        // Refresh the sudo timestamp interactively first, so the actual step
        // does not stall on a password prompt mid-recipe.
        let status = tokio::process::Command::new("sudo")
            .arg("-v")
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .context("failed to run sudo -v")?;
        if !status.success() {
            anyhow::bail!("sudo authentication failed");
        }

        // sudo strips the environment; pass the injected variables through
        // `env` explicitly.
        let mut sudo_args: Vec<String> = Vec::new();
        if !opts.env.is_empty() {
            sudo_args.push("env".to_string());
            for (key, value) in sorted_env(opts) {
                sudo_args.push(format!("{key}={value}"));
            }
        }
        sudo_args.push(program.to_string());
        sudo_args.extend(args.iter().cloned());

        self.exec("sudo", &sudo_args, &ExecOptions::default()).await
    }
}

impl StepExecutor for TerminalStepExecutor {
    async fn run(&self, command: &str, args: &[String], opts: &ExecOptions) -> Result<()> {
        if opts.sensitive && !self.confirm(&opts.prompt)? {
            anyhow::bail!("operation cancelled");
        }

        #[cfg(unix)]
        if opts.require_sudo && !nix::unistd::geteuid().is_root() {
            return self.exec_with_sudo(command, args, opts).await;
        }

        self.exec(command, args, opts).await
    }
}

/// Injected environment in deterministic key order.
fn sorted_env(opts: &ExecOptions) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = opts
        .env
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    pairs.sort();
    pairs
}

// ── Unit tests ────────────────────────────────────────────────────────────────
