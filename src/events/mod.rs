//! Lifecycle events published by the orchestrator.
//!
//! Events go to two places: a `tokio::sync::broadcast` channel that any
//! number of observers can subscribe to, and an optional synchronous
//! listener registered at construction. Publishing never waits on a
//! subscriber; a subscriber that falls behind sees `RecvError::Lagged`.
//!
//! Emission happens synchronously at the point of the state change, so
//! `session_started` precedes `decomposition_complete` and a unit's
//! `subprd_started` precedes its terminal event.

use crate::decomposition::SplitBy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default broadcast buffer per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Events emitted during orchestration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// A session was created for a PRD.
    SessionStarted {
        session_id: String,
        prd_id: String,
        stories: usize,
    },
    /// The PRD was split into sub-PRDs.
    DecompositionComplete {
        session_id: String,
        strategy: SplitBy,
        sub_prds: usize,
        can_parallelize: bool,
    },
    /// A sub-PRD was handed to its specialist worker.
    SubprdStarted {
        session_id: String,
        sub_prd_id: String,
        specialist_id: String,
    },
    /// A sub-PRD finished successfully.
    SubprdCompleted {
        session_id: String,
        sub_prd_id: String,
        duration_ms: u64,
        files_changed: usize,
    },
    /// A dispatched sub-PRD failed or timed out.
    SubprdFailed {
        session_id: String,
        sub_prd_id: String,
        error: String,
    },
    /// Execution results were merged (or the merge was refused).
    MergeComplete {
        session_id: String,
        success: bool,
        merged_files: usize,
        conflicts: usize,
    },
    /// The test runner reported on the merged output.
    VerificationComplete {
        session_id: String,
        passed: bool,
        tests_run: u32,
        tests_passed: u32,
    },
    /// The session was cancelled.
    SessionCancelled {
        session_id: String,
        cancelled_units: usize,
    },
}

impl OrchestratorEvent {
    /// Wire name of the event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::DecompositionComplete { .. } => "decomposition_complete",
            Self::SubprdStarted { .. } => "subprd_started",
            Self::SubprdCompleted { .. } => "subprd_completed",
            Self::SubprdFailed { .. } => "subprd_failed",
            Self::MergeComplete { .. } => "merge_complete",
            Self::VerificationComplete { .. } => "verification_complete",
            Self::SessionCancelled { .. } => "session_cancelled",
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            Self::SessionStarted { session_id, .. }
            | Self::DecompositionComplete { session_id, .. }
            | Self::SubprdStarted { session_id, .. }
            | Self::SubprdCompleted { session_id, .. }
            | Self::SubprdFailed { session_id, .. }
            | Self::MergeComplete { session_id, .. }
            | Self::VerificationComplete { session_id, .. }
            | Self::SessionCancelled { session_id, .. } => session_id,
        }
    }

    /// Sub-PRD the event concerns, for per-unit events.
    pub fn sub_prd_id(&self) -> Option<&str> {
        match self {
            Self::SubprdStarted { sub_prd_id, .. }
            | Self::SubprdCompleted { sub_prd_id, .. }
            | Self::SubprdFailed { sub_prd_id, .. } => Some(sub_prd_id),
            _ => None,
        }
    }
}

/// Synchronous observer invoked for every event.
pub type EventListener = Arc<dyn Fn(&OrchestratorEvent) + Send + Sync>;

/// Fan-out publisher for [`OrchestratorEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OrchestratorEvent>,
    listener: Option<EventListener>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.tx.receiver_count())
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, listener: None }
    }

    /// Register the synchronous listener.
    pub fn with_listener(mut self, listener: EventListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Subscribe to every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: OrchestratorEvent) {
        tracing::trace!(
            event = event.event_type(),
            session = event.session_id(),
            "publishing event"
        );
        if let Some(ref listener) = self.listener {
            listener(&event);
        }
        // No subscribers is fine.
        self.tx.send(event).ok();
    }
}
