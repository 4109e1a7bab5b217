//! Module installer: multi-provider resolution plus a retrying, sequential
//! step runner.
//!
//! Providers are scanned in priority order; a provider that errors is warned
//! about and skipped, never fatal, as long as a later provider has the
//! module. Steps execute strictly in sequence through the injected executor;
//! a step that exhausts its retries aborts the whole install immediately.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;

use crate::application::ports::{ExecOptions, Reporter, StepExecutor};
use crate::domain::error::ModuleError;
use crate::domain::module::{InstallAttempt, InstallReport, ModuleDefinition};
use crate::domain::settings::{MirrorSettings, ModuleSettings};
use crate::infra::catalog::CatalogProvider;
use crate::infra::mirror::MirrorResolver;

/// Environment variable carrying the selected mirror prefix into steps.
pub const PROXY_PREFIX_ENV: &str = "OUTPOST_PROXY_PREFIX";

/// Environment variable carrying the full candidate list into steps.
pub const PROXY_MIRRORS_ENV: &str = "OUTPOST_PROXY_MIRRORS";

/// Installer over an ordered provider list.
pub struct ModuleInstaller<'a> {
    settings: &'a ModuleSettings,
    mirrors: &'a MirrorSettings,
    providers: Vec<CatalogProvider>,
    reporter: &'a dyn Reporter,
}

impl<'a> ModuleInstaller<'a> {
    /// Build an installer with the provider order derived from settings.
    #[must_use]
    pub fn new(
        settings: &'a ModuleSettings,
        mirrors: &'a MirrorSettings,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            providers: crate::infra::catalog::build_providers(settings),
            settings,
            mirrors,
            reporter,
        }
    }

    /// Build an installer with an explicit provider list (used in tests).
    #[must_use]
    pub fn with_providers(
        settings: &'a ModuleSettings,
        mirrors: &'a MirrorSettings,
        reporter: &'a dyn Reporter,
        providers: Vec<CatalogProvider>,
    ) -> Self {
        Self {
            providers,
            settings,
            mirrors,
            reporter,
        }
    }

    /// Merge all providers' definitions; the first occurrence of a name wins
    /// (provider priority order), later duplicates are ignored.
    #[must_use]
    pub fn list(&self) -> Vec<ModuleDefinition> {
        let mut order: Vec<String> = Vec::new();
        let mut defs: HashMap<String, ModuleDefinition> = HashMap::new();

        for provider in &self.providers {
            let items = match provider.list() {
                Ok(items) => items,
                Err(err) => {
                    self.reporter.warn(&format!(
                        "module catalog unavailable provider={}: {err}",
                        provider.name()
                    ));
                    continue;
                }
            };
            for def in items {
                let name = def.name.trim().to_string();
                if name.is_empty() || defs.contains_key(&name) {
                    continue;
                }
                order.push(name.clone());
                defs.insert(name, def);
            }
        }

        order.into_iter().filter_map(|n| defs.remove(&n)).collect()
    }

    /// Resolve and install a module, returning the full attempt audit trail.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::NotFound`] when no provider has the module,
    /// and [`ModuleError::StepFailed`] when a step exhausts its retries.
    pub async fn install(
        &self,
        executor: &impl StepExecutor,
        module_name: &str,
    ) -> Result<InstallReport> {
        let mut report = InstallReport::begin(module_name, Utc::now());
        let (def, source) = self.resolve_module(module_name)?;
        report.source = source;
        if def.install.is_empty() {
            report.ended_at = Utc::now();
            return Err(ModuleError::NoSteps(module_name.to_string()).into());
        }

        let selection = MirrorResolver::new(
            &self.mirrors.urls,
            &self.mirrors.probe_url,
            self.mirrors.probe_seconds,
        )
        .resolve(self.reporter);
        let mut env = HashMap::new();
        env.insert(
            PROXY_PREFIX_ENV.to_string(),
            selection.prefix.clone().unwrap_or_default(),
        );
        env.insert(PROXY_MIRRORS_ENV.to_string(), selection.candidates_joined());
        match &selection.prefix {
            Some(prefix) => self
                .reporter
                .success(&format!("module download proxy selected: {prefix}")),
            None => self.reporter.warn(&format!(
                "module download proxy falling back to direct, mirrors={}",
                selection.candidates_joined()
            )),
        }

        let retries = self.settings.install_retries.max(1);
        for step in &def.install {
            let step_name = step.display_name().to_string();
            if step.command.trim().is_empty() {
                report.ended_at = Utc::now();
                return Err(ModuleError::EmptyStepCommand(module_name.to_string()).into());
            }
            let opts = ExecOptions {
                sensitive: step.sensitive,
                require_sudo: step.require_sudo,
                prompt: step.prompt.clone(),
                env: env.clone(),
            };

            let mut last_error: Option<anyhow::Error> = None;
            for try_number in 1..=retries {
                let started_at = Utc::now();
                let result = executor.run(&step.command, &step.args, &opts).await;
                let ended_at = Utc::now();

                match result {
                    Ok(()) => {
                        report.attempts.push(InstallAttempt {
                            step_name: step_name.clone(),
                            command: step.command.clone(),
                            args: step.args.clone(),
                            try_number,
                            started_at,
                            ended_at,
                            error: None,
                        });
                        last_error = None;
                        self.reporter.success(&format!(
                            "module step succeeded module={module_name} step={step_name} try={try_number}"
                        ));
                        break;
                    }
                    Err(err) => {
                        self.reporter.warn(&format!(
                            "module step failed module={module_name} step={step_name} try={try_number}: {err}"
                        ));
                        report.attempts.push(InstallAttempt {
                            step_name: step_name.clone(),
                            command: step.command.clone(),
                            args: step.args.clone(),
                            try_number,
                            started_at,
                            ended_at,
                            error: Some(err.to_string()),
                        });
                        last_error = Some(err);
                        if try_number < retries && self.settings.install_backoff_seconds > 0 {
                            tokio::time::sleep(Duration::from_secs(
                                self.settings.install_backoff_seconds,
                            ))
                            .await;
                        }
                    }
                }
            }

            if let Some(err) = last_error {
                report.ended_at = Utc::now();
                return Err(ModuleError::StepFailed {
                    module: module_name.to_string(),
                    step: step_name,
                    reason: err.to_string(),
                }
                .into());
            }
        }

        report.success = true;
        report.ended_at = Utc::now();
        self.reporter.success(&format!(
            "module install succeeded module={module_name} source={}",
            report.source
        ));
        Ok(report)
    }

    fn resolve_module(&self, module_name: &str) -> Result<(ModuleDefinition, String)> {
        let name = module_name.trim();
        if name.is_empty() {
            return Err(ModuleError::EmptyName.into());
        }
        for provider in &self.providers {
            let items = match provider.list() {
                Ok(items) => items,
                Err(err) => {
                    self.reporter.warn(&format!(
                        "module provider unavailable provider={}: {err}",
                        provider.name()
                    ));
                    continue;
                }
            };
            if let Some(def) = items
                .into_iter()
                .find(|d| d.name.trim().eq_ignore_ascii_case(name))
            {
                return Ok((def, provider.name()));
            }
        }
        Err(ModuleError::NotFound(name.to_string()).into())
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::application::ports::NullReporter;
    use crate::domain::module::ModuleStep;
    use crate::infra::testserver::TestServer;
    use std::sync::Mutex;

    /// Executor that fails a fixed number of times before succeeding, and
    /// records the environment it saw.
    struct FlakyExecutor {
        failures_left: Mutex<u32>,
        seen_env: Mutex<Vec<HashMap<String, String>>>,
    }

    impl FlakyExecutor {
        fn failing(times: u32) -> Self {
            Self {
                failures_left: Mutex::new(times),
                seen_env: Mutex::new(Vec::new()),
            }
        }
    }

    impl StepExecutor for &FlakyExecutor {
        async fn run(&self, _: &str, _: &[String], opts: &ExecOptions) -> Result<()> {
            self.seen_env
                .lock()
                .expect("env lock")
                .push(opts.env.clone());
            let mut left = self.failures_left.lock().expect("failures lock");
            if *left > 0 {
                *left -= 1;
                anyhow::bail!("transient failure");
            }
            Ok(())
        }
    }

    fn module_settings(retries: u32) -> ModuleSettings {
        ModuleSettings {
            catalog_urls: Vec::new(),
            catalog_timeout_seconds: 2,
            install_retries: retries,
            install_backoff_seconds: 0,
            prefer_catalog_source: false,
        }
    }

    /// Mirror settings with no probe URL: resolution is direct, no network.
    fn direct_mirrors() -> MirrorSettings {
        MirrorSettings {
            urls: vec!["https://m.example".to_string()],
            probe_url: String::new(),
            probe_seconds: 1,
        }
    }

    #[tokio::test]
    async fn test_install_step_succeeds_on_third_try_with_three_attempts_recorded() {
        let settings = module_settings(3);
        let mirrors = direct_mirrors();
        let installer = ModuleInstaller::new(&settings, &mirrors, &NullReporter);
        let executor = FlakyExecutor::failing(2);

        let report = installer
            .install(&&executor, "adapter-example")
            .await
            .expect("install succeeds on try 3");

        assert!(report.success);
        assert_eq!(report.source, "builtin");
        let attempts = report.attempts_for("install adapter");
        assert_eq!(attempts.len(), 3);
        assert!(attempts[0].error.is_some());
        assert!(attempts[1].error.is_some());
        assert!(attempts[2].error.is_none());
    }

    #[tokio::test]
    async fn test_install_step_exhausting_retries_aborts_and_names_step() {
        let settings = module_settings(2);
        let mirrors = direct_mirrors();
        let installer = ModuleInstaller::new(&settings, &mirrors, &NullReporter);
        let executor = FlakyExecutor::failing(10);

        let err = installer
            .install(&&executor, "adapter-example")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("install adapter"), "got: {err}");
        assert!(err.to_string().contains("adapter-example"), "got: {err}");
    }

    #[tokio::test]
    async fn test_install_injects_mirror_environment() {
        let settings = module_settings(1);
        let mirrors = direct_mirrors();
        let installer = ModuleInstaller::new(&settings, &mirrors, &NullReporter);
        let executor = FlakyExecutor::failing(0);

        installer
            .install(&&executor, "adapter-example")
            .await
            .expect("install");

        let seen = executor.seen_env.lock().expect("env lock");
        let env = &seen[0];
        // No probe URL → direct access: empty prefix, full candidate list.
        assert_eq!(env.get(PROXY_PREFIX_ENV).map(String::as_str), Some(""));
        assert_eq!(
            env.get(PROXY_MIRRORS_ENV).map(String::as_str),
            Some("https://m.example")
        );
    }

    #[tokio::test]
    async fn test_install_unknown_module_is_not_found() {
        let settings = module_settings(1);
        let mirrors = direct_mirrors();
        let installer = ModuleInstaller::new(&settings, &mirrors, &NullReporter);
        let executor = FlakyExecutor::failing(0);

        let err = installer.install(&&executor, "nope").await.unwrap_err();
        assert!(err.to_string().contains("not found"), "got: {err}");
    }

    #[test]
    fn test_list_merges_providers_first_name_wins() {
        let remote = TestServer::respond_with(
            200,
            br#"{"modules":[
                {"name":"adapter-example","description":"remote override"},
                {"name":"remote-only","description":"from remote"}
            ]}"#,
        );
        let settings = module_settings(1);
        let mirrors = direct_mirrors();
        let providers = vec![
            CatalogProvider::Builtin,
            CatalogProvider::Http {
                url: remote.url("/catalog.json"),
                timeout: Duration::from_secs(2),
            },
        ];
        let installer =
            ModuleInstaller::with_providers(&settings, &mirrors, &NullReporter, providers);

        let defs = installer.list();
        let adapter = defs
            .iter()
            .find(|d| d.name == "adapter-example")
            .expect("adapter-example present");
        assert_ne!(
            adapter.description, "remote override",
            "builtin must win over later providers"
        );
        assert!(defs.iter().any(|d| d.name == "remote-only"));
    }

    #[test]
    fn test_list_skips_erroring_provider() {
        let broken = TestServer::respond_with(500, b"boom");
        let settings = module_settings(1);
        let mirrors = direct_mirrors();
        let providers = vec![
            CatalogProvider::Http {
                url: broken.url("/catalog.json"),
                timeout: Duration::from_secs(2),
            },
            CatalogProvider::Builtin,
        ];
        let installer =
            ModuleInstaller::with_providers(&settings, &mirrors, &NullReporter, providers);

        let defs = installer.list();
        assert!(
            defs.iter().any(|d| d.name == "adapter-example"),
            "builtin definitions must survive a broken remote"
        );
    }

    #[tokio::test]
    async fn test_install_resolves_from_later_provider_when_first_errors() {
        let broken = TestServer::respond_with(500, b"boom");
        let settings = module_settings(1);
        let mirrors = direct_mirrors();
        let providers = vec![
            CatalogProvider::Http {
                url: broken.url("/catalog.json"),
                timeout: Duration::from_secs(2),
            },
            CatalogProvider::Builtin,
        ];
        let installer =
            ModuleInstaller::with_providers(&settings, &mirrors, &NullReporter, providers);
        let executor = FlakyExecutor::failing(0);

        let report = installer
            .install(&&executor, "adapter-example")
            .await
            .expect("install via builtin fallback");
        assert_eq!(report.source, "builtin");
    }
}
