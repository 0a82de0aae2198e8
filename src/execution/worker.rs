//! The specialist worker contract and its process-backed adapter.

use crate::decomposition::SubPrd;
use crate::util::tail_lines;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// What a worker reports back for one sub-PRD.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerOutcome {
    pub success: bool,
    #[serde(default)]
    pub files_changed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerOutcome {
    pub fn success(files: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            success: true,
            files_changed: files.into_iter().map(Into::into).collect(),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            files_changed: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Performs the actual work for a sub-PRD.
///
/// Implementations must be safe to call concurrently for different
/// sub-PRDs. An `Err` is recorded as a failed unit of kind `worker`.
#[async_trait]
pub trait SpecialistWorker: Send + Sync {
    async fn invoke(&self, sub_prd: &SubPrd) -> Result<WorkerOutcome>;
}

/// Runs an external command per sub-PRD.
///
/// The command runs through `sh -c`, receives the sub-PRD as JSON on stdin
/// and must print a JSON [`WorkerOutcome`] on stdout. `PRDFORGE_SPECIALIST`
/// and `PRDFORGE_SUBPRD_ID` are set in its environment.
#[derive(Debug, Clone)]
pub struct ProcessWorker {
    command: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl ProcessWorker {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl SpecialistWorker for ProcessWorker {
    async fn invoke(&self, sub_prd: &SubPrd) -> Result<WorkerOutcome> {
        let payload =
            serde_json::to_string(sub_prd).context("Failed to serialize sub-PRD for worker")?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(format!("{} \"$@\"", self.command))
            .arg("sh")
            .args(&self.args)
            .env("PRDFORGE_SPECIALIST", &sub_prd.assigned_specialist_id)
            .env("PRDFORGE_SUBPRD_ID", &sub_prd.id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn worker command: {}", self.command))?;

        // Feed stdin while draining stdout so neither side can fill its pipe
        // and stall the other.
        let stdin = child.stdin.take();
        let feed = async move {
            match stdin {
                Some(mut stdin) => stdin.write_all(payload.as_bytes()).await,
                None => Ok(()),
            }
        };
        let (written, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.context("Failed to wait for worker command")?;

        match written {
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                // The worker is free to ignore its input; the exit status decides.
                tracing::debug!(sub_prd = %sub_prd.id, "worker closed stdin early");
            }
            Err(e) => return Err(e).context("Failed to write sub-PRD to worker stdin"),
            Ok(()) => {}
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "process exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                tail_lines(stderr.trim(), 5)
            );
        }

        parse_worker_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse worker stdout: the last non-empty line must be a JSON outcome.
///
/// Empty output from a successful process counts as success with no files.
pub fn parse_worker_output(stdout: &str) -> Result<WorkerOutcome> {
    let Some(line) = stdout.lines().rev().map(str::trim).find(|l| !l.is_empty()) else {
        return Ok(WorkerOutcome::success(Vec::<String>::new()));
    };
    serde_json::from_str(line)
        .or_else(|_| serde_json::from_str(stdout.trim()))
        .with_context(|| format!("Worker printed invalid outcome JSON: {}", line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prd::Story;

    fn sub_prd() -> SubPrd {
        SubPrd::new("prd-sub-1", "prd", "api", vec![Story::new("S-1", "Endpoint")])
    }

    #[test]
    fn test_parse_worker_output_last_line() {
        let out = "working...\n{\"success\":true,\"filesChanged\":[\"src/api.rs\"]}\n";
        let outcome = parse_worker_output(out).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.files_changed, vec!["src/api.rs"]);
    }

    #[test]
    fn test_parse_worker_output_pretty_json() {
        let out = "{\n  \"success\": false,\n  \"error\": \"no tests\"\n}\n";
        let outcome = parse_worker_output(out).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("no tests"));
    }

    #[test]
    fn test_parse_worker_output_empty_is_success() {
        let outcome = parse_worker_output("  \n").unwrap();
        assert!(outcome.success);
        assert!(outcome.files_changed.is_empty());
    }

    #[test]
    fn test_parse_worker_output_garbage() {
        assert!(parse_worker_output("not json").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_worker_reads_env_and_stdout() {
        let worker = ProcessWorker::new(
            r#"cat > /dev/null; printf '{"success":true,"filesChanged":["%s.rs"]}\n' "$PRDFORGE_SPECIALIST""#,
        );
        let outcome = worker.invoke(&sub_prd()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.files_changed, vec!["api.rs"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_worker_receives_sub_prd_on_stdin() {
        let worker = ProcessWorker::new(
            r#"grep -q '"id":"prd-sub-1"' && echo '{"success":true}' || echo '{"success":false}'"#,
        );
        let outcome = worker.invoke(&sub_prd()).await.unwrap();
        assert!(outcome.success);
    }

    fn large_sub_prd() -> SubPrd {
        let stories = (0..400)
            .map(|i| Story::new(&format!("S-{i}"), &"x".repeat(500)))
            .collect();
        SubPrd::new("prd-sub-1", "prd", "api", stories)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_worker_may_ignore_stdin() {
        let worker = ProcessWorker::new(r#"echo '{"success":true,"filesChanged":["a.rs"]}'"#);
        let outcome = worker.invoke(&large_sub_prd()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.files_changed, vec!["a.rs"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_worker_large_output_before_reading_stdin() {
        let worker = ProcessWorker::new(
            r#"head -c 200000 /dev/zero | tr '\0' x; echo; wc -c > /dev/null; echo '{"success":true}'"#,
        );
        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(20),
            worker.invoke(&large_sub_prd()),
        )
        .await
        .expect("worker stalled")
        .unwrap();
        assert!(outcome.success);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_worker_nonzero_exit() {
        let worker = ProcessWorker::new("cat > /dev/null; echo broken >&2; exit 3");
        let err = worker.invoke(&sub_prd()).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("code 3"), "{msg}");
        assert!(msg.contains("broken"), "{msg}");
    }
}
