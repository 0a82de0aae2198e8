//! Core types for the decomposition system.
//!
//! These types represent sub-PRDs and the derived analyses over them.

use crate::prd::Story;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Status of a sub-PRD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubPrdStatus {
    /// Waiting to be dispatched.
    #[default]
    Pending,
    /// Handed to a specialist worker.
    Running,
    /// Worker reported success.
    Completed,
    /// Worker reported failure, errored or timed out.
    Failed,
    /// Never dispatched because the session was cancelled.
    Cancelled,
}

impl SubPrdStatus {
    /// Check if the sub-PRD is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if the sub-PRD completed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for SubPrdStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A disjoint slice of a PRD's stories assigned to one specialist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubPrd {
    pub id: String,
    pub parent_prd_id: String,
    pub title: String,
    pub stories: Vec<Story>,
    pub assigned_specialist_id: String,
    #[serde(default)]
    pub status: SubPrdStatus,
}

impl SubPrd {
    pub fn new(id: &str, parent_prd_id: &str, specialist_id: &str, stories: Vec<Story>) -> Self {
        Self {
            id: id.to_string(),
            parent_prd_id: parent_prd_id.to_string(),
            title: String::new(),
            stories,
            assigned_specialist_id: specialist_id.to_string(),
            status: SubPrdStatus::Pending,
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    /// Union of the affected files of every story, deduplicated.
    pub fn affected_files(&self) -> BTreeSet<String> {
        self.stories
            .iter()
            .flat_map(|s| s.affected_files.iter().cloned())
            .collect()
    }

    pub fn total_complexity(&self) -> u32 {
        self.stories.iter().map(|s| u32::from(s.complexity)).sum()
    }

    pub fn story_ids(&self) -> Vec<&str> {
        self.stories.iter().map(|s| s.id.as_str()).collect()
    }
}

/// A file listed by two different sub-PRDs.
///
/// `sub_prd_a` always sorts before `sub_prd_b`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConflict {
    pub file: String,
    pub sub_prd_a: String,
    pub sub_prd_b: String,
}

impl FileConflict {
    pub fn new(file: &str, a: &str, b: &str) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self {
            file: file.to_string(),
            sub_prd_a: first.to_string(),
            sub_prd_b: second.to_string(),
        }
    }

    pub fn involves(&self, sub_prd_id: &str) -> bool {
        self.sub_prd_a == sub_prd_id || self.sub_prd_b == sub_prd_id
    }
}

/// Pairwise file overlap across a set of sub-PRDs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictAnalysis {
    pub potential_conflicts: Vec<FileConflict>,
    pub can_parallelize: bool,
}

impl ConflictAnalysis {
    /// Ids of every sub-PRD that takes part in at least one conflict.
    pub fn conflicting_ids(&self) -> BTreeSet<String> {
        self.potential_conflicts
            .iter()
            .flat_map(|c| [c.sub_prd_a.clone(), c.sub_prd_b.clone()])
            .collect()
    }
}

/// Stories and complexity assigned to one specialist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentWork {
    pub stories: usize,
    pub complexity: u32,
}

/// Aggregate size of a decomposition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkEstimate {
    pub total_stories: usize,
    pub total_complexity: u32,
    /// Keyed by specialist id.
    pub by_agent: BTreeMap<String, AgentWork>,
}
