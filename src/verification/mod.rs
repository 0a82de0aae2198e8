//! Verification engine: the final acceptance gate.
//!
//! The merged file list is handed to a [`TestRunner`]. A session only
//! reaches `completed` when the runner reports `passed`.

use crate::errors::OrchestratorError;
use crate::events::OrchestratorEvent;
use crate::session::{SessionManager, SessionStatus};
use crate::util::tail_lines;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Default timeout for a test run in seconds.
pub const DEFAULT_TEST_TIMEOUT_SECS: u64 = 1800;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub passed: bool,
    #[serde(default)]
    pub tests_run: u32,
    #[serde(default)]
    pub tests_passed: u32,
    #[serde(default)]
    pub failures: Vec<String>,
}

impl VerificationResult {
    pub fn passed(tests_run: u32) -> Self {
        Self {
            passed: true,
            tests_run,
            tests_passed: tests_run,
            failures: Vec::new(),
        }
    }

    pub fn failed(failures: Vec<String>) -> Self {
        Self {
            passed: false,
            failures,
            ..Self::default()
        }
    }
}

/// Runs the test suite over the merged output.
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run(&self, merged_files: &[String]) -> Result<VerificationResult>;
}

/// Environment variable holding the merged files, one per line.
pub const ENV_MERGED_FILES: &str = "PRDFORGE_MERGED_FILES";

/// Runs a shell command over the merged output.
///
/// The merged files are listed in [`ENV_MERGED_FILES`], one per line. They
/// are only appended as positional arguments when [`with_file_args`] is set,
/// since most test commands (`cargo test`, `npm test`) read extra arguments
/// as filters.
///
/// [`with_file_args`]: ProcessTestRunner::with_file_args
///
/// If the command prints a JSON [`VerificationResult`] on stdout it is used
/// as-is. Otherwise the exit status decides `passed`, and on failure the
/// tail of stderr becomes the failure detail.
#[derive(Debug, Clone)]
pub struct ProcessTestRunner {
    command: String,
    working_dir: Option<PathBuf>,
    timeout: Duration,
    file_args: bool,
}

impl ProcessTestRunner {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            working_dir: None,
            timeout: Duration::from_secs(DEFAULT_TEST_TIMEOUT_SECS),
            file_args: false,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Also pass the merged files as positional arguments.
    pub fn with_file_args(mut self, enabled: bool) -> Self {
        self.file_args = enabled;
        self
    }
}

#[async_trait]
impl TestRunner for ProcessTestRunner {
    async fn run(&self, merged_files: &[String]) -> Result<VerificationResult> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c");
        if self.file_args {
            cmd.arg(format!("{} \"$@\"", self.command))
                .arg("sh")
                .args(merged_files);
        } else {
            cmd.arg(&self.command);
        }
        cmd.env(ENV_MERGED_FILES, merged_files.join("\n"))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn test command: {}", self.command))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .with_context(|| format!("Test command timed out after {}s", self.timeout.as_secs()))?
            .context("Failed to wait for test command")?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if let Some(reported) = parse_report(&stdout) {
            return Ok(reported);
        }

        if output.status.success() {
            Ok(VerificationResult::passed(0))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut detail = format!(
                "test command exited with code {}",
                output.status.code().unwrap_or(-1)
            );
            let tail = tail_lines(stderr.trim(), 20);
            if !tail.is_empty() {
                detail.push_str(": ");
                detail.push_str(&tail);
            }
            Ok(VerificationResult::failed(vec![detail]))
        }
    }
}

fn parse_report(stdout: &str) -> Option<VerificationResult> {
    let last = stdout.lines().rev().map(str::trim).find(|l| !l.is_empty())?;
    serde_json::from_str(last)
        .or_else(|_| serde_json::from_str(stdout.trim()))
        .ok()
}

/// Drives the test runner for a merged session.
pub struct VerificationEngine {
    sessions: Arc<SessionManager>,
    runner: Arc<dyn TestRunner>,
}

impl std::fmt::Debug for VerificationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationEngine").finish_non_exhaustive()
    }
}

impl VerificationEngine {
    pub fn new(sessions: Arc<SessionManager>, runner: Arc<dyn TestRunner>) -> Self {
        Self { sessions, runner }
    }

    /// Verify a merged session.
    ///
    /// Requires a successful merge. Moves the session `merging → verifying`,
    /// then to `completed` on pass or `failed` otherwise. A runner error is
    /// reported as a failed verification, not as an `Err`. If the session was
    /// cancelled while the runner was in flight it stays `failed`; the result
    /// is still stored and `verification_complete` is still emitted.
    pub async fn verify_results(
        &self,
        session_id: &str,
    ) -> Result<VerificationResult, OrchestratorError> {
        let session = self
            .sessions
            .get_session(session_id)
            .ok_or_else(|| OrchestratorError::SessionNotFound {
                id: session_id.to_string(),
            })?;

        let merged_files = match &session.merge {
            Some(merge) if merge.success => merge.merged_files.clone(),
            _ => {
                return Err(OrchestratorError::MergeRequired {
                    id: session_id.to_string(),
                });
            }
        };

        self.sessions
            .transition(session_id, SessionStatus::Verifying)?;
        tracing::info!(session = %session_id, files = merged_files.len(), "running verification");

        let result = match self.runner.run(&merged_files).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(session = %session_id, error = %e, "test runner failed");
                VerificationResult::failed(vec![format!("test runner error: {e:#}")])
            }
        };

        // The session may have been cancelled while the runner was busy; a
        // terminal session keeps its status and only records the result.
        let stored = result.clone();
        let settled = self.sessions.update(session_id, |s| {
            s.verification = Some(stored);
            if s.status.is_terminal() {
                return false;
            }
            if result.passed {
                s.status = SessionStatus::Completed;
            } else {
                s.status = SessionStatus::Failed;
                s.error = Some("verification failed".to_string());
            }
            true
        });

        match settled {
            Some(true) if result.passed => {
                tracing::info!(
                    session = %session_id,
                    tests_run = result.tests_run,
                    "verification passed"
                );
            }
            Some(true) => {
                for failure in &result.failures {
                    tracing::warn!(session = %session_id, %failure, "verification failure");
                }
                tracing::warn!(session = %session_id, "session failed: verification failed");
            }
            _ => {
                tracing::info!(
                    session = %session_id,
                    passed = result.passed,
                    "session ended during verification; result recorded only"
                );
            }
        }

        self.sessions
            .events()
            .emit(OrchestratorEvent::VerificationComplete {
                session_id: session_id.to_string(),
                passed: result.passed,
                tests_run: result.tests_run,
                tests_passed: result.tests_passed,
            });

        Ok(result)
    }
}
