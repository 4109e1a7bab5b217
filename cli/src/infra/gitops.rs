//! Git fetches with mirror rewriting, per-source retry, and ordered fallback.
//!
//! Sources are tried strictly in order: enabled mirrors rewritten from the
//! origin URL (mirror base + origin host + path), placed before or after the
//! unmodified origin according to `mirror_first`. The first successful
//! attempt across any source stops the whole procedure. Every attempt is
//! recorded for auditability.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::application::ports::{CommandRunner, Reporter};
use crate::domain::settings::GitSettings;

// ── Audit types ───────────────────────────────────────────────────────────────

/// Git operation recorded in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitOperation {
    Clone,
    Pull,
}

/// One remote a fetch may be attempted against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSource {
    pub name: String,
    pub url: String,
}

/// One try of one source.
#[derive(Debug, Clone)]
pub struct GitAttempt {
    pub source: GitSource,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub error: Option<String>,
}

/// Audit record of a whole clone or pull.
#[derive(Debug, Clone)]
pub struct GitReport {
    pub operation: GitOperation,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub success: bool,
    pub used_source: Option<GitSource>,
    pub attempts: Vec<GitAttempt>,
}

impl GitReport {
    fn begin(operation: GitOperation, target: &str) -> Self {
        let now = Utc::now();
        Self {
            operation,
            target: target.to_string(),
            started_at: now,
            ended_at: now,
            success: false,
            used_source: None,
            attempts: Vec::new(),
        }
    }
}

/// Aggregate failure after every source exhausted its retries. Carries the
/// full report so callers keep the audit trail.
#[derive(Debug, Error)]
#[error("git clone failed after trying {sources} sources")]
pub struct CloneFailed {
    pub sources: usize,
    pub report: GitReport,
}

// ── Manager ───────────────────────────────────────────────────────────────────

/// Clone/pull front-end over an injected [`CommandRunner`].
pub struct GitSourceManager<R> {
    settings: GitSettings,
    runner: R,
}

impl<R: CommandRunner> GitSourceManager<R> {
    #[must_use]
    pub fn new(settings: GitSettings, runner: R) -> Self {
        Self { settings, runner }
    }

    /// Clone `repo_url` into `dest`, walking the source list in order with
    /// per-source retries.
    ///
    /// # Errors
    ///
    /// Returns [`CloneFailed`] when every source exhausts its retries, or an
    /// error when no source can be built at all.
    pub async fn clone_repo(
        &self,
        repo_url: &str,
        dest: &Path,
        reporter: &dyn Reporter,
    ) -> Result<GitReport> {
        let target = dest.display().to_string();
        let mut report = GitReport::begin(GitOperation::Clone, &target);
        let sources = build_sources(repo_url, &self.settings);
        if sources.is_empty() {
            anyhow::bail!("no git source available");
        }

        let retries = self.settings.retry_per_source.max(1);
        for source in &sources {
            for attempt in 1..=retries {
                let started_at = Utc::now();
                let result = self
                    .run_git(&["clone", &source.url, &target], None)
                    .await;
                let ended_at = Utc::now();

                match result {
                    Ok(()) => {
                        report.attempts.push(GitAttempt {
                            source: source.clone(),
                            attempt,
                            started_at,
                            ended_at,
                            error: None,
                        });
                        report.success = true;
                        report.used_source = Some(source.clone());
                        report.ended_at = Utc::now();
                        reporter.success(&format!(
                            "git clone succeeded source={} destination={target}",
                            source.name
                        ));
                        return Ok(report);
                    }
                    Err(err) => {
                        reporter.warn(&format!(
                            "git clone failed source={} attempt={attempt}: {err}",
                            source.name
                        ));
                        report.attempts.push(GitAttempt {
                            source: source.clone(),
                            attempt,
                            started_at,
                            ended_at,
                            error: Some(err.to_string()),
                        });
                        if attempt < retries {
                            tokio::time::sleep(Duration::from_secs(
                                self.settings.retry_backoff_seconds,
                            ))
                            .await;
                        }
                    }
                }
            }
        }

        report.ended_at = Utc::now();
        Err(CloneFailed {
            sources: sources.len(),
            report,
        }
        .into())
    }

    /// Fast-forward-only pull against the already-configured origin, with a
    /// single attempt record.
    ///
    /// # Errors
    ///
    /// Returns the git error when the pull fails.
    pub async fn pull(&self, repo_dir: &Path, reporter: &dyn Reporter) -> Result<GitReport> {
        let target = repo_dir.display().to_string();
        let mut report = GitReport::begin(GitOperation::Pull, &target);
        let source = GitSource {
            name: "origin".to_string(),
            url: "(configured in repo)".to_string(),
        };

        let started_at = Utc::now();
        let result = self
            .run_git(&["pull", "--ff-only"], Some(repo_dir))
            .await;
        let ended_at = Utc::now();

        report.attempts.push(GitAttempt {
            source: source.clone(),
            attempt: 1,
            started_at,
            ended_at,
            error: result.as_ref().err().map(ToString::to_string),
        });
        report.ended_at = Utc::now();

        match result {
            Ok(()) => {
                report.success = true;
                report.used_source = Some(source);
                reporter.success(&format!("git pull succeeded dir={target}"));
                Ok(report)
            }
            Err(err) => {
                reporter.warn(&format!("git pull failed dir={target}: {err}"));
                Err(err)
            }
        }
    }

    async fn run_git(&self, args: &[&str], workdir: Option<&Path>) -> Result<()> {
        let timeout = Duration::from_secs(self.settings.command_timeout_seconds.max(1));
        let output = self.runner.run("git", args, workdir, timeout).await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let trimmed = stderr.trim();
        if trimmed.is_empty() {
            anyhow::bail!("git exited with {}", output.status);
        }
        anyhow::bail!("git exited with {}: {trimmed}", output.status);
    }
}

// ── Source construction ───────────────────────────────────────────────────────

/// Build the prioritized source list for `repo_url`.
fn build_sources(repo_url: &str, settings: &GitSettings) -> Vec<GitSource> {
    let origin = GitSource {
        name: "origin".to_string(),
        url: repo_url.to_string(),
    };
    let mirrors: Vec<GitSource> = settings
        .mirrors
        .iter()
        .filter(|m| m.enabled)
        .filter_map(|m| {
            rewrite_url(repo_url, &m.base_url).map(|url| GitSource {
                name: m.name.clone(),
                url,
            })
        })
        .collect();

    if settings.mirror_first {
        mirrors.into_iter().chain(std::iter::once(origin)).collect()
    } else {
        std::iter::once(origin).chain(mirrors).collect()
    }
}

/// Substitute the mirror's base for the origin host while preserving the
/// path: `https://host/a/b` through `https://mirror` becomes
/// `https://mirror/host/a/b`. Returns `None` when either URL is unusable.
fn rewrite_url(repo_url: &str, mirror_base: &str) -> Option<String> {
    let repo = repo_url.trim();
    let rest = repo
        .strip_prefix("https://")
        .or_else(|| repo.strip_prefix("http://"))?;
    let (host, path) = rest.split_once('/')?;
    if host.is_empty() || path.is_empty() {
        return None;
    }

    let base = mirror_base.trim().trim_end_matches('/');
    let stripped = base
        .strip_prefix("https://")
        .or_else(|| base.strip_prefix("http://"))?;
    if stripped.is_empty() {
        return None;
    }
    let path = path.split(['?', '#']).next().unwrap_or(path);
    Some(format!("{base}/{host}/{path}"))
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::application::ports::NullReporter;
    use crate::domain::settings::GitMirror;
    use std::process::Output;
    use std::sync::Mutex;

    /// Scripted runner: pops one canned exit code per call and records the
    /// command lines it saw.
    struct ScriptedRunner {
        script: Mutex<Vec<i32>>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        fn new(codes: &[i32]) -> Self {
            let mut script: Vec<i32> = codes.to_vec();
            script.reverse();
            Self {
                script: Mutex::new(script),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().expect("seen lock").clone()
        }
    }

    #[cfg(unix)]
    fn exit_status(code: i32) -> std::process::ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        std::process::ExitStatus::from_raw(code << 8)
    }

    #[cfg(windows)]
    fn exit_status(code: i32) -> std::process::ExitStatus {
        use std::os::windows::process::ExitStatusExt;
        #[allow(clippy::cast_sign_loss)]
        std::process::ExitStatus::from_raw(code as u32)
    }

    impl CommandRunner for &ScriptedRunner {
        async fn run(
            &self,
            program: &str,
            args: &[&str],
            _workdir: Option<&Path>,
            _timeout: Duration,
        ) -> Result<Output> {
            self.seen
                .lock()
                .expect("seen lock")
                .push(format!("{program} {}", args.join(" ")));
            let code = self.script.lock().expect("script lock").pop().unwrap_or(0);
            Ok(Output {
                status: exit_status(code),
                stdout: Vec::new(),
                stderr: if code == 0 {
                    Vec::new()
                } else {
                    b"fatal: remote error".to_vec()
                },
            })
        }
    }

    fn settings(mirror_first: bool) -> GitSettings {
        GitSettings {
            mirrors: vec![
                GitMirror {
                    name: "fast".to_string(),
                    base_url: "https://mirror.example".to_string(),
                    enabled: true,
                },
                GitMirror {
                    name: "off".to_string(),
                    base_url: "https://disabled.example".to_string(),
                    enabled: false,
                },
            ],
            mirror_first,
            retry_per_source: 2,
            retry_backoff_seconds: 0,
            command_timeout_seconds: 5,
        }
    }

    const REPO: &str = "https://github.com/acme/agent.git";

    #[test]
    fn test_rewrite_url_preserves_host_and_path() {
        let url = rewrite_url(REPO, "https://mirror.example/").expect("rewrite");
        assert_eq!(url, "https://mirror.example/github.com/acme/agent.git");
    }

    #[test]
    fn test_rewrite_url_rejects_unusable_inputs() {
        assert!(rewrite_url("not-a-url", "https://mirror.example").is_none());
        assert!(rewrite_url("https://host-only", "https://mirror.example").is_none());
        assert!(rewrite_url(REPO, "").is_none());
    }

    #[test]
    fn test_build_sources_mirror_first_ordering() {
        let sources = build_sources(REPO, &settings(true));
        let names: Vec<&str> = sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["fast", "origin"], "disabled mirror must be skipped");
    }

    #[test]
    fn test_build_sources_origin_first_ordering() {
        let sources = build_sources(REPO, &settings(false));
        let names: Vec<&str> = sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["origin", "fast"]);
    }

    #[tokio::test]
    async fn test_clone_first_source_success_stops_immediately() {
        let runner = ScriptedRunner::new(&[0]);
        let mgr = GitSourceManager::new(settings(true), &runner);
        let report = mgr
            .clone_repo(REPO, Path::new("/tmp/dest"), &NullReporter)
            .await
            .expect("clone");

        assert!(report.success);
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.used_source.expect("source").name, "fast");
        assert_eq!(runner.seen().len(), 1);
    }

    #[tokio::test]
    async fn test_clone_falls_back_to_origin_after_mirror_retries() {
        // mirror fails twice, origin succeeds on its first try
        let runner = ScriptedRunner::new(&[1, 1, 0]);
        let mgr = GitSourceManager::new(settings(true), &runner);
        let report = mgr
            .clone_repo(REPO, Path::new("/tmp/dest"), &NullReporter)
            .await
            .expect("clone");

        assert!(report.success);
        assert_eq!(report.attempts.len(), 3);
        assert_eq!(report.used_source.expect("source").name, "origin");
        assert!(report.attempts[0].error.is_some());
        assert!(report.attempts[2].error.is_none());
    }

    #[tokio::test]
    async fn test_clone_all_sources_exhausted_is_aggregate_failure() {
        let runner = ScriptedRunner::new(&[1, 1, 1, 1]);
        let mgr = GitSourceManager::new(settings(true), &runner);
        let err = mgr
            .clone_repo(REPO, Path::new("/tmp/dest"), &NullReporter)
            .await
            .unwrap_err();

        assert!(
            err.to_string().contains("after trying 2 sources"),
            "got: {err}"
        );
        let failed = err.downcast_ref::<CloneFailed>().expect("CloneFailed");
        assert_eq!(failed.report.attempts.len(), 4, "2 sources x 2 retries");
        assert!(failed.report.attempts.iter().all(|a| a.error.is_some()));
    }

    #[tokio::test]
    async fn test_pull_records_single_attempt() {
        let runner = ScriptedRunner::new(&[0]);
        let mgr = GitSourceManager::new(settings(true), &runner);
        let report = mgr
            .pull(Path::new("/tmp/repo"), &NullReporter)
            .await
            .expect("pull");

        assert!(report.success);
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(runner.seen(), vec!["git pull --ff-only"]);
    }

    #[tokio::test]
    async fn test_pull_failure_keeps_error_text() {
        let runner = ScriptedRunner::new(&[1]);
        let mgr = GitSourceManager::new(settings(true), &runner);
        let err = mgr
            .pull(Path::new("/tmp/repo"), &NullReporter)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("remote error"), "got: {err}");
    }
}
