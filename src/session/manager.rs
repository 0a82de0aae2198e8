//! In-memory session registry and the session state machine.

use crate::decomposition::{
    DecomposeOptions, Decomposer, SplitBy, SubPrd, SubPrdStatus, WorkEstimate, analyze_conflicts,
    estimate_work,
};
use crate::errors::OrchestratorError;
use crate::events::{EventBus, OrchestratorEvent};
use crate::execution::ExecutionResult;
use crate::merge::MergeResult;
use crate::prd::Prd;
use crate::session::SessionStatus;
use crate::verification::VerificationResult;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// One orchestration run for a single PRD.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationSession {
    pub id: String,
    pub prd: Prd,
    pub sub_prds: Vec<SubPrd>,
    pub status: SessionStatus,
    pub split_by: SplitBy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Latest execution result per sub-PRD, in sub-PRD order once executed.
    #[serde(default)]
    pub results: Vec<ExecutionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationResult>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OrchestrationSession {
    fn new(prd: Prd, sub_prds: Vec<SubPrd>, split_by: SplitBy) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            prd,
            sub_prds,
            status: SessionStatus::Decomposing,
            split_by,
            created_at: now,
            updated_at: now,
            results: Vec::new(),
            merge: None,
            verification: None,
            cancelled: false,
            error: None,
        }
    }

    pub fn sub_prd(&self, id: &str) -> Option<&SubPrd> {
        self.sub_prds.iter().find(|s| s.id == id)
    }

    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            completed: self
                .sub_prds
                .iter()
                .filter(|s| s.status == SubPrdStatus::Completed)
                .count(),
            failed: self
                .sub_prds
                .iter()
                .filter(|s| matches!(s.status, SubPrdStatus::Failed | SubPrdStatus::Cancelled))
                .count(),
            total: self.sub_prds.len(),
        }
    }

    pub fn estimate(&self) -> WorkEstimate {
        estimate_work(&self.sub_prds)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Sub-PRD counts for progress reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

/// Read-only projection returned by [`SessionManager::get_session_status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatusView {
    pub status: SessionStatus,
    pub cancelled: bool,
    pub progress: SessionProgress,
    pub estimate: WorkEstimate,
}

/// Owns every live session behind a mutex.
///
/// Sessions are only ever removed by [`SessionManager::cleanup_sessions`].
#[derive(Debug)]
pub struct SessionManager {
    sessions: Mutex<HashMap<String, OrchestrationSession>>,
    decomposer: Decomposer,
    default_options: DecomposeOptions,
    events: EventBus,
}

impl SessionManager {
    pub fn new(decomposer: Decomposer, default_options: DecomposeOptions, events: EventBus) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            decomposer,
            default_options,
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn decomposer(&self) -> &Decomposer {
        &self.decomposer
    }

    /// Create a session using the manager's default decomposition options.
    pub fn create_session(&self, prd: Prd) -> OrchestrationSession {
        self.create_session_with(prd, self.default_options)
    }

    /// Decompose `prd` and register a session ready for execution.
    ///
    /// The session is stored before any event is emitted, so listeners can
    /// look it up. Emits `session_started` then `decomposition_complete`.
    pub fn create_session_with(&self, prd: Prd, options: DecomposeOptions) -> OrchestrationSession {
        let sub_prds = self.decomposer.decompose_prd(&prd, &options);
        let session = OrchestrationSession::new(prd, sub_prds, options.split_by);
        let id = session.id.clone();
        let prd_id = session.prd.id.clone();
        let stories = session.prd.stories.len();
        let can_parallelize = analyze_conflicts(&session.sub_prds).can_parallelize;

        self.sessions.lock().insert(id.clone(), session.clone());

        self.events.emit(OrchestratorEvent::SessionStarted {
            session_id: id.clone(),
            prd_id,
            stories,
        });

        // A listener may have cancelled or removed the session already.
        let session = self
            .update(&id, |s| {
                if s.status == SessionStatus::Decomposing {
                    s.status = SessionStatus::Executing;
                }
                s.clone()
            })
            .unwrap_or(session);

        tracing::info!(
            session = %session.id,
            prd = %session.prd.id,
            strategy = %options.split_by,
            sub_prds = session.sub_prds.len(),
            "session created"
        );

        self.events.emit(OrchestratorEvent::DecompositionComplete {
            session_id: id,
            strategy: options.split_by,
            sub_prds: session.sub_prds.len(),
            can_parallelize,
        });

        session
    }

    pub fn get_session(&self, id: &str) -> Option<OrchestrationSession> {
        self.sessions.lock().get(id).cloned()
    }

    /// All sessions, oldest first.
    pub fn get_all_sessions(&self) -> Vec<OrchestrationSession> {
        let mut sessions: Vec<OrchestrationSession> =
            self.sessions.lock().values().cloned().collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        sessions
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Status projection; `None` for unknown ids.
    pub fn get_session_status(&self, id: &str) -> Option<SessionStatusView> {
        let sessions = self.sessions.lock();
        let session = sessions.get(id)?;
        Some(SessionStatusView {
            status: session.status,
            cancelled: session.cancelled,
            progress: session.progress(),
            estimate: session.estimate(),
        })
    }

    /// Cancel a session cooperatively.
    ///
    /// Pending sub-PRDs become `cancelled` and a non-terminal session becomes
    /// `failed`. Units already running are left to finish. Returns `false`
    /// for unknown ids.
    pub fn cancel_session(&self, id: &str) -> bool {
        let cancelled_units = {
            let mut sessions = self.sessions.lock();
            let Some(session) = sessions.get_mut(id) else {
                return false;
            };

            let mut count = 0;
            for sub in session
                .sub_prds
                .iter_mut()
                .filter(|s| s.status == SubPrdStatus::Pending)
            {
                sub.status = SubPrdStatus::Cancelled;
                count += 1;
            }
            if !session.status.is_terminal() {
                session.status = SessionStatus::Failed;
                session.error = Some("cancelled".to_string());
            }
            session.cancelled = true;
            session.touch();
            count
        };

        tracing::info!(session = %id, cancelled_units, "session cancelled");
        self.events.emit(OrchestratorEvent::SessionCancelled {
            session_id: id.to_string(),
            cancelled_units,
        });
        true
    }

    /// Remove sessions older than `max_age`; a zero age removes everything.
    ///
    /// Returns the number of sessions removed.
    pub fn cleanup_sessions(&self, max_age: Duration) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();

        if max_age.is_zero() {
            sessions.clear();
        } else {
            let now = Utc::now();
            sessions.retain(|_, session| {
                let age = (now - session.created_at).to_std().unwrap_or_default();
                age <= max_age
            });
        }

        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!(removed, remaining = sessions.len(), "cleaned up sessions");
        }
        removed
    }

    /// Move a session to `to`, rejecting transitions the state machine forbids.
    ///
    /// Returns the previous status.
    pub(crate) fn transition(
        &self,
        id: &str,
        to: SessionStatus,
    ) -> Result<SessionStatus, OrchestratorError> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| OrchestratorError::SessionNotFound { id: id.to_string() })?;

        let from = session.status;
        if !from.can_transition_to(to) {
            return Err(OrchestratorError::InvalidTransition {
                id: id.to_string(),
                from,
                to,
            });
        }

        session.status = to;
        session.touch();
        tracing::debug!(session = %id, %from, %to, "session transition");
        Ok(from)
    }

    /// Mark a session failed with a reason, if it is not already terminal.
    pub(crate) fn fail(&self, id: &str, reason: &str) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(id)
            && !session.status.is_terminal()
        {
            tracing::warn!(session = %id, reason, "session failed");
            session.status = SessionStatus::Failed;
            session.error = Some(reason.to_string());
            session.touch();
        }
    }

    /// Run `f` against a session under the registry lock.
    pub(crate) fn update<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut OrchestrationSession) -> R,
    ) -> Option<R> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(id)?;
        let out = f(session);
        session.touch();
        Some(out)
    }

    /// Atomically move a sub-PRD from `pending` to `running`.
    ///
    /// Returns `false` when the unit is no longer pending (e.g. cancelled).
    pub(crate) fn try_start_sub_prd(&self, session_id: &str, sub_prd_id: &str) -> bool {
        self.update(session_id, |session| {
            match session.sub_prds.iter_mut().find(|s| s.id == sub_prd_id) {
                Some(sub) if sub.status == SubPrdStatus::Pending => {
                    sub.status = SubPrdStatus::Running;
                    true
                }
                _ => false,
            }
        })
        .unwrap_or(false)
    }

    pub(crate) fn set_sub_prd_status(
        &self,
        session_id: &str,
        sub_prd_id: &str,
        status: SubPrdStatus,
    ) {
        self.update(session_id, |session| {
            if let Some(sub) = session.sub_prds.iter_mut().find(|s| s.id == sub_prd_id) {
                sub.status = status;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prd::Story;
    use crate::specialists::Domain;

    fn manager() -> SessionManager {
        SessionManager::new(
            Decomposer::default(),
            DecomposeOptions::default(),
            EventBus::default(),
        )
    }

    fn prd() -> Prd {
        Prd::new("prd-1", "Two domains")
            .add_story(Story::new("S-1", "ui").with_domain(Domain::Ui))
            .add_story(Story::new("S-2", "api").with_domain(Domain::Api))
    }

    #[test]
    fn test_create_session_is_executable() {
        let mgr = manager();
        let session = mgr.create_session(prd());
        assert_eq!(session.status, SessionStatus::Executing);
        assert_eq!(session.sub_prds.len(), 2);
        assert_eq!(session.split_by, SplitBy::Domain);
        assert!(mgr.get_session(&session.id).is_some());
        assert_eq!(mgr.get_all_sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_create_session_emits_in_order() {
        let mgr = manager();
        let mut rx = mgr.events().subscribe();
        let session = mgr.create_session(prd());

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.event_type(), "session_started");
        assert_eq!(second.event_type(), "decomposition_complete");
        assert_eq!(first.session_id(), session.id);
    }

    #[test]
    fn test_status_projection() {
        let mgr = manager();
        let session = mgr.create_session(prd());
        let view = mgr.get_session_status(&session.id).unwrap();
        assert_eq!(view.status, SessionStatus::Executing);
        assert_eq!(view.progress.total, 2);
        assert_eq!(view.progress.completed, 0);
        assert_eq!(view.estimate.total_stories, 2);
        assert!(mgr.get_session_status("missing").is_none());
    }

    #[test]
    fn test_cancel_session() {
        let mgr = manager();
        let session = mgr.create_session(prd());

        assert!(mgr.cancel_session(&session.id));
        let after = mgr.get_session(&session.id).unwrap();
        assert_eq!(after.status, SessionStatus::Failed);
        assert!(after.cancelled);
        assert!(
            after
                .sub_prds
                .iter()
                .all(|s| s.status == SubPrdStatus::Cancelled)
        );
        assert!(!mgr.cancel_session("unknown"));
    }

    #[test]
    fn test_cancel_leaves_running_units_alone() {
        let mgr = manager();
        let session = mgr.create_session(prd());
        let running = session.sub_prds[0].id.clone();
        assert!(mgr.try_start_sub_prd(&session.id, &running));

        mgr.cancel_session(&session.id);
        let after = mgr.get_session(&session.id).unwrap();
        assert_eq!(after.sub_prd(&running).unwrap().status, SubPrdStatus::Running);
        assert_eq!(after.sub_prds[1].status, SubPrdStatus::Cancelled);
        assert!(!mgr.try_start_sub_prd(&session.id, &after.sub_prds[1].id));
    }

    #[test]
    fn test_cleanup_sessions() {
        let mgr = manager();
        mgr.create_session(prd());
        mgr.create_session(prd());

        assert_eq!(mgr.cleanup_sessions(Duration::from_secs(3600)), 0);
        assert_eq!(mgr.session_count(), 2);

        assert_eq!(mgr.cleanup_sessions(Duration::ZERO), 2);
        assert_eq!(mgr.session_count(), 0);
    }

    #[test]
    fn test_cleanup_keeps_sessions_younger_than_max_age() {
        let mgr = manager();
        let old = mgr.create_session(prd());
        std::thread::sleep(Duration::from_millis(120));
        let young = mgr.create_session(prd());

        assert_eq!(mgr.cleanup_sessions(Duration::from_millis(60)), 1);
        assert!(mgr.get_session(&old.id).is_none());
        assert!(mgr.get_session(&young.id).is_some());
    }

    #[test]
    fn test_session_is_visible_to_listener_on_start() {
        use parking_lot::Mutex as PlMutex;
        use std::sync::Arc;

        let slot: Arc<PlMutex<Option<Arc<SessionManager>>>> = Arc::new(PlMutex::new(None));
        let seen: Arc<PlMutex<Vec<Option<SessionStatus>>>> = Arc::new(PlMutex::new(Vec::new()));

        let listener_slot = slot.clone();
        let listener_seen = seen.clone();
        let bus = EventBus::default().with_listener(Arc::new(move |event: &OrchestratorEvent| {
            let Some(mgr) = listener_slot.lock().clone() else {
                return;
            };
            let status = mgr.get_session(event.session_id()).map(|s| s.status);
            listener_seen.lock().push(status);
        }));

        let mgr = Arc::new(SessionManager::new(
            Decomposer::default(),
            DecomposeOptions::default(),
            bus,
        ));
        *slot.lock() = Some(mgr.clone());

        mgr.create_session(prd());
        // Drop the cycle through the listener.
        slot.lock().take();

        assert_eq!(
            *seen.lock(),
            vec![Some(SessionStatus::Decomposing), Some(SessionStatus::Executing)]
        );
    }

    #[test]
    fn test_transition_rules_enforced() {
        let mgr = manager();
        let session = mgr.create_session(prd());

        let err = mgr
            .transition(&session.id, SessionStatus::Completed)
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
        assert_eq!(
            mgr.get_session(&session.id).unwrap().status,
            SessionStatus::Executing
        );

        assert_eq!(
            mgr.transition(&session.id, SessionStatus::Merging).unwrap(),
            SessionStatus::Executing
        );
        assert!(matches!(
            mgr.transition("nope", SessionStatus::Merging),
            Err(OrchestratorError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn test_fail_does_not_override_terminal() {
        let mgr = manager();
        let session = mgr.create_session(prd());
        mgr.fail(&session.id, "boom");
        let failed = mgr.get_session(&session.id).unwrap();
        assert_eq!(failed.status, SessionStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));

        mgr.fail(&session.id, "again");
        assert_eq!(
            mgr.get_session(&session.id).unwrap().error.as_deref(),
            Some("boom")
        );
    }
}
