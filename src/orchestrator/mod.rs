//! The orchestrator facade.
//!
//! An [`Orchestrator`] owns one session registry plus the execution, merge
//! and verification engines that drive it. Independent instances share
//! nothing, so tests and tenants simply construct their own.
//!
//! ## Example
//!
//! ```no_run
//! use prdforge::config::OrchestratorConfig;
//! use prdforge::orchestrator::Orchestrator;
//! use prdforge::prd::Prd;
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = OrchestratorConfig::default()
//!     .with_worker_command("./scripts/specialist.sh")
//!     .with_test_command("cargo test");
//! let orchestrator = Orchestrator::from_config(config)?;
//!
//! let prd = Prd::load(Path::new("prd.json"))?;
//! let report = orchestrator.run(prd).await?;
//! println!("{} -> {}", report.session_id, report.status);
//! # Ok(())
//! # }
//! ```

use crate::config::OrchestratorConfig;
use crate::decomposition::{
    ConflictAnalysis, DecomposeOptions, Decomposer, SubPrd, WorkEstimate, analyze_conflicts,
    estimate_work,
};
use crate::errors::{ConfigError, OrchestratorError};
use crate::events::{EventBus, OrchestratorEvent};
use crate::execution::{ExecutionEngine, ExecutionResult, ProcessWorker, SpecialistWorker};
use crate::merge::{MergeEngine, MergeResult};
use crate::prd::Prd;
use crate::session::{OrchestrationSession, SessionManager, SessionStatus, SessionStatusView};
use crate::verification::{ProcessTestRunner, TestRunner, VerificationEngine, VerificationResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Final state of a full [`Orchestrator::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub session_id: String,
    pub status: SessionStatus,
    pub cancelled: bool,
    pub sub_prds: Vec<SubPrd>,
    pub results: Vec<ExecutionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    fn from_session(session: OrchestrationSession) -> Self {
        Self {
            session_id: session.id,
            status: session.status,
            cancelled: session.cancelled,
            sub_prds: session.sub_prds,
            results: session.results,
            merge: session.merge,
            verification: session.verification,
            error: session.error,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

/// Decomposes, executes, merges and verifies PRDs.
#[derive(Debug)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    sessions: Arc<SessionManager>,
    execution: ExecutionEngine,
    merge: MergeEngine,
    verification: VerificationEngine,
}

impl Orchestrator {
    /// Build an orchestrator around injected collaborators.
    ///
    /// Invalid configuration (such as `max_concurrent == 0`) is rejected here.
    pub fn new(
        config: OrchestratorConfig,
        worker: Arc<dyn SpecialistWorker>,
        runner: Arc<dyn TestRunner>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let decomposer = Decomposer::new(Arc::new(config.registry()?));
        let mut events = EventBus::default();
        if let Some(listener) = config.on_event.clone() {
            events = events.with_listener(listener);
        }
        let sessions = Arc::new(SessionManager::new(
            decomposer,
            config.decompose_options()?,
            events,
        ));

        let execution = ExecutionEngine::new(sessions.clone(), worker, config.execution_settings())?;
        let merge = MergeEngine::new(sessions.clone(), config.merge_mode);
        let verification = VerificationEngine::new(sessions.clone(), runner);

        tracing::debug!(
            parallel = config.parallel_execution,
            max_concurrent = config.max_concurrent,
            merge_mode = %config.merge_mode,
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            sessions,
            execution,
            merge,
            verification,
        })
    }

    /// Build an orchestrator using the configured worker and test commands.
    pub fn from_config(config: OrchestratorConfig) -> Result<Self, ConfigError> {
        let worker_cmd = config
            .worker
            .command
            .clone()
            .ok_or(ConfigError::MissingCommand {
                setting: "worker command",
            })?;
        let test_cmd = config
            .verification
            .command
            .clone()
            .ok_or(ConfigError::MissingCommand {
                setting: "test command",
            })?;

        let worker = ProcessWorker::new(worker_cmd).with_args(config.worker.args.clone());
        let runner = ProcessTestRunner::new(test_cmd)
            .with_timeout(Duration::from_secs(config.verification.timeout_secs))
            .with_file_args(config.verification.file_args);

        Self::new(config, Arc::new(worker), Arc::new(runner))
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.sessions.events().subscribe()
    }

    pub fn decompose_prd(&self, prd: &Prd, options: &DecomposeOptions) -> Vec<SubPrd> {
        self.sessions.decomposer().decompose_prd(prd, options)
    }

    pub fn analyze_conflicts(&self, sub_prds: &[SubPrd]) -> ConflictAnalysis {
        analyze_conflicts(sub_prds)
    }

    pub fn estimate_work(&self, sub_prds: &[SubPrd]) -> WorkEstimate {
        estimate_work(sub_prds)
    }

    pub fn create_session(&self, prd: Prd) -> OrchestrationSession {
        self.sessions.create_session(prd)
    }

    pub fn create_session_with(&self, prd: Prd, options: DecomposeOptions) -> OrchestrationSession {
        self.sessions.create_session_with(prd, options)
    }

    pub fn get_session(&self, id: &str) -> Option<OrchestrationSession> {
        self.sessions.get_session(id)
    }

    pub fn get_all_sessions(&self) -> Vec<OrchestrationSession> {
        self.sessions.get_all_sessions()
    }

    pub fn get_session_status(&self, id: &str) -> Option<SessionStatusView> {
        self.sessions.get_session_status(id)
    }

    pub fn cancel_session(&self, id: &str) -> bool {
        self.sessions.cancel_session(id)
    }

    pub fn cleanup_sessions(&self, max_age: Duration) -> usize {
        self.sessions.cleanup_sessions(max_age)
    }

    pub async fn execute_session(
        &self,
        id: &str,
    ) -> Result<Vec<ExecutionResult>, OrchestratorError> {
        self.execution.execute_session(id).await
    }

    pub fn merge_results(&self, id: &str) -> Result<MergeResult, OrchestratorError> {
        self.merge.merge_results(id)
    }

    pub async fn verify_results(&self, id: &str) -> Result<VerificationResult, OrchestratorError> {
        self.verification.verify_results(id).await
    }

    /// Drive a PRD through every stage, stopping at the first failed gate.
    pub async fn run(&self, prd: Prd) -> Result<RunReport, OrchestratorError> {
        let session = self.create_session(prd);
        let id = session.id;

        self.execute_session(&id).await?;

        if self.status_of(&id)? == SessionStatus::Executing {
            let merge = self.merge_results(&id)?;
            if merge.success {
                self.verify_results(&id).await?;
            }
        }

        let session = self
            .get_session(&id)
            .ok_or_else(|| OrchestratorError::SessionNotFound { id: id.clone() })?;
        tracing::info!(
            session = %id,
            status = %session.status,
            cancelled = session.cancelled,
            "run finished"
        );
        Ok(RunReport::from_session(session))
    }

    fn status_of(&self, id: &str) -> Result<SessionStatus, OrchestratorError> {
        self.sessions
            .get_session(id)
            .map(|s| s.status)
            .ok_or_else(|| OrchestratorError::SessionNotFound { id: id.to_string() })
    }
}
