//! Merge engine.
//!
//! Unions the `files_changed` of every successful execution result and
//! refuses the merge when two units touched the same file. Failed units are
//! left out of the union and listed in [`MergeResult::failed_units`].

use crate::decomposition::FileConflict;
use crate::errors::{ConfigError, OrchestratorError};
use crate::events::OrchestratorEvent;
use crate::execution::ExecutionResult;
use crate::session::{SessionManager, SessionStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Conflict resolution policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Any conflict fails the merge.
    #[default]
    Strict,
    /// Conflicts are reported; the last sub-PRD in list order owns the file.
    LastWriterWins,
}

impl std::fmt::Display for MergeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeMode::Strict => write!(f, "strict"),
            MergeMode::LastWriterWins => write!(f, "last_writer_wins"),
        }
    }
}

impl FromStr for MergeMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "strict" => Ok(MergeMode::Strict),
            "last_writer_wins" | "lww" => Ok(MergeMode::LastWriterWins),
            _ => Err(ConfigError::UnknownMergeMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub success: bool,
    pub merged_files: Vec<String>,
    pub conflicts: Vec<FileConflict>,
    #[serde(rename = "durationMs", with = "crate::util::duration_ms")]
    pub duration: Duration,
    /// Sub-PRDs whose execution failed or never ran.
    #[serde(default)]
    pub failed_units: Vec<String>,
    /// File to owning sub-PRD, filled on success.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub owners: BTreeMap<String, String>,
}

/// Merge a set of execution results.
///
/// `unit_ids` is the session's sub-PRD list; units with no result count as
/// failed. Results are considered in `unit_ids` order.
pub fn merge_files(unit_ids: &[String], results: &[ExecutionResult], mode: MergeMode) -> MergeResult {
    let start = Instant::now();

    let mut failed_units = Vec::new();
    let mut successful: Vec<&ExecutionResult> = Vec::new();
    for id in unit_ids {
        match results.iter().find(|r| &r.sub_prd_id == id) {
            Some(result) if result.success => successful.push(result),
            _ => failed_units.push(id.clone()),
        }
    }

    // Every writer per file, in list order.
    let mut writers: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for result in &successful {
        let files: BTreeSet<&str> = result.files_changed.iter().map(String::as_str).collect();
        for file in files {
            writers.entry(file).or_default().push(&result.sub_prd_id);
        }
    }

    let mut conflicts: Vec<FileConflict> = Vec::new();
    for (file, ids) in &writers {
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                conflicts.push(FileConflict::new(file, a, b));
            }
        }
    }
    conflicts.sort();

    let all_failed = successful.is_empty() && !unit_ids.is_empty();
    let success = !all_failed && (conflicts.is_empty() || mode == MergeMode::LastWriterWins);

    let (merged_files, owners) = if success {
        let owners: BTreeMap<String, String> = writers
            .iter()
            .filter_map(|(file, ids)| ids.last().map(|id| (file.to_string(), id.to_string())))
            .collect();
        (owners.keys().cloned().collect(), owners)
    } else {
        (Vec::new(), BTreeMap::new())
    };

    MergeResult {
        success,
        merged_files,
        conflicts,
        duration: start.elapsed(),
        failed_units,
        owners,
    }
}

/// Merges the stored execution results of a session.
#[derive(Debug)]
pub struct MergeEngine {
    sessions: Arc<SessionManager>,
    mode: MergeMode,
}

impl MergeEngine {
    pub fn new(sessions: Arc<SessionManager>, mode: MergeMode) -> Self {
        Self { sessions, mode }
    }

    pub fn mode(&self) -> MergeMode {
        self.mode
    }

    /// Merge a session's results, moving it `executing → merging`.
    ///
    /// A refused merge leaves the session `failed`. The only error cases are
    /// an unknown id and a session that is not `executing`.
    pub fn merge_results(&self, session_id: &str) -> Result<MergeResult, OrchestratorError> {
        self.sessions.transition(session_id, SessionStatus::Merging)?;

        let session = self
            .sessions
            .get_session(session_id)
            .ok_or_else(|| OrchestratorError::SessionNotFound {
                id: session_id.to_string(),
            })?;
        let unit_ids: Vec<String> = session.sub_prds.iter().map(|s| s.id.clone()).collect();
        let result = merge_files(&unit_ids, &session.results, self.mode);

        if !result.failed_units.is_empty() {
            tracing::warn!(
                session = %session_id,
                failed = ?result.failed_units,
                "excluding failed units from merge"
            );
        }
        for conflict in &result.conflicts {
            tracing::warn!(
                session = %session_id,
                file = %conflict.file,
                a = %conflict.sub_prd_a,
                b = %conflict.sub_prd_b,
                "merge conflict"
            );
        }

        let stored = result.clone();
        self.sessions.update(session_id, |s| s.merge = Some(stored));

        if result.success {
            tracing::info!(
                session = %session_id,
                files = result.merged_files.len(),
                mode = %self.mode,
                "merge succeeded"
            );
        } else if result.conflicts.is_empty() {
            self.sessions.fail(session_id, "merge failed: no successful units");
        } else {
            self.sessions.fail(
                session_id,
                &format!("merge failed: {} conflict(s)", result.conflicts.len()),
            );
        }

        self.sessions.events().emit(OrchestratorEvent::MergeComplete {
            session_id: session_id.to_string(),
            success: result.success,
            merged_files: result.merged_files.len(),
            conflicts: result.conflicts.len(),
        });

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decomposition::{DecomposeOptions, Decomposer};
    use crate::events::EventBus;
    use crate::prd::{Prd, Story};
    use crate::specialists::Domain;

    fn ok(id: &str, files: &[&str]) -> ExecutionResult {
        ExecutionResult::succeeded(id, Duration::ZERO, files.iter().map(|f| f.to_string()).collect())
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_disjoint_files_merge() {
        let results = vec![ok("a", &["x.rs", "y.rs"]), ok("b", &["z.rs"])];
        let merge = merge_files(&ids(&["a", "b"]), &results, MergeMode::Strict);
        assert!(merge.success);
        assert_eq!(merge.merged_files, vec!["x.rs", "y.rs", "z.rs"]);
        assert!(merge.conflicts.is_empty());
        assert_eq!(merge.owners["z.rs"], "b");
    }

    #[test]
    fn test_overlap_fails_strict_merge() {
        let results = vec![ok("a", &["shared.rs", "x.rs"]), ok("b", &["shared.rs"])];
        let merge = merge_files(&ids(&["a", "b"]), &results, MergeMode::Strict);
        assert!(!merge.success);
        assert_eq!(merge.conflicts, vec![FileConflict::new("shared.rs", "a", "b")]);
        assert!(merge.merged_files.is_empty());
        assert!(merge.owners.is_empty());
    }

    #[test]
    fn test_last_writer_wins() {
        let results = vec![
            ok("a", &["shared.rs"]),
            ok("b", &["shared.rs", "b.rs"]),
            ok("c", &["shared.rs"]),
        ];
        let merge = merge_files(&ids(&["a", "b", "c"]), &results, MergeMode::LastWriterWins);
        assert!(merge.success);
        assert_eq!(merge.conflicts.len(), 3);
        assert_eq!(merge.owners["shared.rs"], "c");
        assert_eq!(merge.merged_files, vec!["b.rs", "shared.rs"]);
    }

    #[test]
    fn test_failed_units_are_excluded() {
        let failed = ExecutionResult::failed(
            "b",
            Duration::ZERO,
            &crate::execution::ExecutionError::Worker("boom".into()),
        );
        let results = vec![ok("a", &["shared.rs"]), failed];
        let merge = merge_files(&ids(&["a", "b", "c"]), &results, MergeMode::Strict);
        assert!(merge.success);
        assert_eq!(merge.merged_files, vec!["shared.rs"]);
        assert_eq!(merge.failed_units, vec!["b", "c"]);
    }

    #[test]
    fn test_all_failed_is_not_a_merge() {
        let merge = merge_files(&ids(&["a"]), &[], MergeMode::Strict);
        assert!(!merge.success);
        assert!(merge.conflicts.is_empty());
        assert_eq!(merge.failed_units, vec!["a"]);
    }

    #[test]
    fn test_empty_session_merges_trivially() {
        let merge = merge_files(&[], &[], MergeMode::Strict);
        assert!(merge.success);
        assert!(merge.merged_files.is_empty());
    }

    #[test]
    fn test_merge_mode_from_str() {
        assert_eq!("strict".parse::<MergeMode>().unwrap(), MergeMode::Strict);
        assert_eq!(
            "last-writer-wins".parse::<MergeMode>().unwrap(),
            MergeMode::LastWriterWins
        );
        assert!(matches!(
            "newest".parse::<MergeMode>(),
            Err(ConfigError::UnknownMergeMode(_))
        ));
    }

    fn session_with_results(files: [&[&str]; 2]) -> (Arc<SessionManager>, String) {
        let sessions = Arc::new(SessionManager::new(
            Decomposer::default(),
            DecomposeOptions::default(),
            EventBus::default(),
        ));
        let prd = Prd::new("prd", "Merge")
            .add_story(Story::new("S-1", "ui").with_domain(Domain::Ui))
            .add_story(Story::new("S-2", "api").with_domain(Domain::Api));
        let session = sessions.create_session(prd);
        let results = vec![
            ok(&session.sub_prds[0].id, files[0]),
            ok(&session.sub_prds[1].id, files[1]),
        ];
        sessions.update(&session.id, |s| s.results = results);
        (sessions, session.id)
    }

    #[test]
    fn test_engine_moves_session_to_merging() {
        let (sessions, id) = session_with_results([&["a.rs"], &["b.rs"]]);
        let mut rx = sessions.events().subscribe();
        let engine = MergeEngine::new(sessions.clone(), MergeMode::Strict);

        let merge = engine.merge_results(&id).unwrap();
        assert!(merge.success);
        let session = sessions.get_session(&id).unwrap();
        assert_eq!(session.status, SessionStatus::Merging);
        assert_eq!(session.merge, Some(merge));
        assert_eq!(rx.try_recv().unwrap().event_type(), "merge_complete");
    }

    #[test]
    fn test_engine_conflict_fails_session() {
        let (sessions, id) = session_with_results([&["same.rs"], &["same.rs"]]);
        let engine = MergeEngine::new(sessions.clone(), MergeMode::Strict);

        let merge = engine.merge_results(&id).unwrap();
        assert!(!merge.success);
        let session = sessions.get_session(&id).unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        assert!(session.error.unwrap().contains("conflict"));

        // A failed session cannot be merged again.
        assert!(matches!(
            engine.merge_results(&id),
            Err(OrchestratorError::InvalidTransition { .. })
        ));
    }
}
