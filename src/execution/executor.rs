//! Dispatches a session's sub-PRDs to the specialist worker.

use super::types::{ExecutionError, ExecutionResult};
use super::worker::SpecialistWorker;
use crate::decomposition::{SubPrd, SubPrdStatus, analyze_conflicts};
use crate::errors::{ConfigError, OrchestratorError};
use crate::events::OrchestratorEvent;
use crate::session::{SessionManager, SessionStatus};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Default per-unit timeout in seconds.
pub const DEFAULT_UNIT_TIMEOUT_SECS: u64 = 600;

/// Default size of the parallel worker pool.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// How sub-PRDs that share files are scheduled in parallel mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Conflicting sub-PRDs run one at a time after the conflict-free ones.
    #[default]
    Serialize,
    /// Conflict analysis is informational only.
    Advisory,
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictPolicy::Serialize => write!(f, "serialize"),
            ConflictPolicy::Advisory => write!(f, "advisory"),
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "serialize" | "sequential" => Ok(ConflictPolicy::Serialize),
            "advisory" | "ignore" => Ok(ConflictPolicy::Advisory),
            _ => Err(ConfigError::UnknownConflictPolicy(s.to_string())),
        }
    }
}

/// Knobs for the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSettings {
    pub parallel: bool,
    pub max_concurrent: usize,
    pub unit_timeout: Duration,
    pub conflict_policy: ConflictPolicy,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            parallel: true,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            unit_timeout: Duration::from_secs(DEFAULT_UNIT_TIMEOUT_SECS),
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

impl ExecutionSettings {
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_unit_timeout(mut self, timeout: Duration) -> Self {
        self.unit_timeout = timeout;
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::InvalidMaxConcurrent(self.max_concurrent));
        }
        if self.unit_timeout.is_zero() {
            return Err(ConfigError::InvalidUnitTimeout);
        }
        Ok(())
    }
}

/// Runs sub-PRDs sequentially or through a bounded pool.
pub struct ExecutionEngine {
    sessions: Arc<SessionManager>,
    worker: Arc<dyn SpecialistWorker>,
    settings: ExecutionSettings,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ExecutionEngine {
    /// Create an engine; fails when `max_concurrent` is zero.
    pub fn new(
        sessions: Arc<SessionManager>,
        worker: Arc<dyn SpecialistWorker>,
        settings: ExecutionSettings,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            sessions,
            worker,
            settings,
        })
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Execute every pending sub-PRD of a session.
    ///
    /// Returns one result per sub-PRD in sub-PRD order. Units that already
    /// have a stored result keep it; units that were cancelled before
    /// dispatch yield a `cancelled` result. Worker failures never abort
    /// sibling units.
    pub async fn execute_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<ExecutionResult>, OrchestratorError> {
        let session = self
            .sessions
            .get_session(session_id)
            .ok_or_else(|| OrchestratorError::SessionNotFound {
                id: session_id.to_string(),
            })?;

        if !session.cancelled && session.status != SessionStatus::Executing {
            return Err(OrchestratorError::InvalidTransition {
                id: session_id.to_string(),
                from: session.status,
                to: SessionStatus::Executing,
            });
        }

        let pending: Vec<SubPrd> = session
            .sub_prds
            .iter()
            .filter(|s| s.status == SubPrdStatus::Pending)
            .cloned()
            .collect();

        tracing::info!(
            session = %session_id,
            pending = pending.len(),
            total = session.sub_prds.len(),
            parallel = self.settings.parallel,
            max_concurrent = self.settings.max_concurrent,
            "executing session"
        );

        let mut fresh: HashMap<String, ExecutionResult> = HashMap::new();
        if self.settings.parallel {
            let (free, serialized) = self.split_by_conflicts(&session.sub_prds, pending);
            if !serialized.is_empty() {
                tracing::warn!(
                    session = %session_id,
                    units = serialized.len(),
                    "conflicting sub-PRDs will run one at a time"
                );
            }
            for result in self.run_parallel(session_id, free).await {
                fresh.insert(result.sub_prd_id.clone(), result);
            }
            for result in self.run_sequential(session_id, serialized).await {
                fresh.insert(result.sub_prd_id.clone(), result);
            }
        } else {
            for result in self.run_sequential(session_id, pending).await {
                fresh.insert(result.sub_prd_id.clone(), result);
            }
        }

        let results: Vec<ExecutionResult> = session
            .sub_prds
            .iter()
            .map(|sub| {
                fresh
                    .remove(&sub.id)
                    .or_else(|| {
                        session
                            .results
                            .iter()
                            .find(|r| r.sub_prd_id == sub.id)
                            .cloned()
                    })
                    .unwrap_or_else(|| ExecutionResult::cancelled(&sub.id))
            })
            .collect();

        let succeeded = results.iter().filter(|r| r.success).count();
        tracing::info!(
            session = %session_id,
            succeeded,
            failed = results.len() - succeeded,
            "execution finished"
        );

        let stored = results.clone();
        self.sessions.update(session_id, |s| s.results = stored);

        Ok(results)
    }

    /// Split pending units into (conflict-free, must-serialize).
    fn split_by_conflicts(
        &self,
        all: &[SubPrd],
        pending: Vec<SubPrd>,
    ) -> (Vec<SubPrd>, Vec<SubPrd>) {
        if self.settings.conflict_policy == ConflictPolicy::Advisory {
            return (pending, Vec::new());
        }
        let conflicting: BTreeSet<String> = analyze_conflicts(all).conflicting_ids();
        pending
            .into_iter()
            .partition(|sub| !conflicting.contains(&sub.id))
    }

    async fn run_sequential(&self, session_id: &str, units: Vec<SubPrd>) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(units.len());
        for sub in units {
            results.push(self.run_unit(session_id, sub).await);
        }
        results
    }

    async fn run_parallel(&self, session_id: &str, units: Vec<SubPrd>) -> Vec<ExecutionResult> {
        let semaphore = Semaphore::new(self.settings.max_concurrent);
        let semaphore = &semaphore;

        let futures: Vec<_> = units
            .into_iter()
            .map(|sub| async move {
                // Hold the permit until the worker returns.
                let _permit = semaphore.acquire().await.ok();
                self.run_unit(session_id, sub).await
            })
            .collect();

        join_all(futures).await
    }

    /// Dispatch one unit unless it was cancelled while queued.
    async fn run_unit(&self, session_id: &str, sub: SubPrd) -> ExecutionResult {
        if !self.sessions.try_start_sub_prd(session_id, &sub.id) {
            tracing::debug!(session = %session_id, sub_prd = %sub.id, "skipping cancelled sub-PRD");
            return ExecutionResult::cancelled(&sub.id);
        }

        tracing::debug!(
            session = %session_id,
            sub_prd = %sub.id,
            specialist = %sub.assigned_specialist_id,
            "dispatching sub-PRD"
        );
        self.sessions.events().emit(OrchestratorEvent::SubprdStarted {
            session_id: session_id.to_string(),
            sub_prd_id: sub.id.clone(),
            specialist_id: sub.assigned_specialist_id.clone(),
        });

        let start = Instant::now();
        let outcome = tokio::time::timeout(self.settings.unit_timeout, self.worker.invoke(&sub)).await;
        let duration = start.elapsed();

        let result = match outcome {
            Ok(Ok(outcome)) if outcome.success => {
                ExecutionResult::succeeded(&sub.id, duration, outcome.files_changed)
            }
            Ok(Ok(outcome)) => {
                let detail = outcome
                    .error
                    .unwrap_or_else(|| "worker reported failure".to_string());
                ExecutionResult::failed(&sub.id, duration, &ExecutionError::Worker(detail))
            }
            Ok(Err(e)) => {
                ExecutionResult::failed(&sub.id, duration, &ExecutionError::Worker(format!("{e:#}")))
            }
            Err(_) => ExecutionResult::failed(
                &sub.id,
                duration,
                &ExecutionError::Timeout(self.settings.unit_timeout),
            ),
        };

        if result.success {
            self.sessions
                .set_sub_prd_status(session_id, &sub.id, SubPrdStatus::Completed);
            self.sessions.events().emit(OrchestratorEvent::SubprdCompleted {
                session_id: session_id.to_string(),
                sub_prd_id: sub.id.clone(),
                duration_ms: duration.as_millis() as u64,
                files_changed: result.files_changed.len(),
            });
        } else {
            let error = result.error.clone().unwrap_or_default();
            tracing::warn!(session = %session_id, sub_prd = %sub.id, %error, "sub-PRD failed");
            self.sessions
                .set_sub_prd_status(session_id, &sub.id, SubPrdStatus::Failed);
            self.sessions.events().emit(OrchestratorEvent::SubprdFailed {
                session_id: session_id.to_string(),
                sub_prd_id: sub.id.clone(),
                error,
            });
        }

        result
    }
}
