//! Decomposer: turns a PRD into capped, specialist-assigned sub-PRDs.

use crate::decomposition::strategy::{SplitBy, StoryGroup};
use crate::decomposition::types::{
    AgentWork, ConflictAnalysis, FileConflict, SubPrd, WorkEstimate,
};
use crate::prd::Prd;
use crate::specialists::SpecialistRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Options for a single decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecomposeOptions {
    pub split_by: SplitBy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stories_per_agent: Option<usize>,
}

impl DecomposeOptions {
    pub fn new(split_by: SplitBy) -> Self {
        Self {
            split_by,
            max_stories_per_agent: None,
        }
    }

    /// Cap the number of stories in any one sub-PRD.
    ///
    /// # Panics
    ///
    /// Panics if `cap` is zero; a zero cap cannot hold any story.
    pub fn with_max_stories_per_agent(mut self, cap: usize) -> Self {
        assert!(cap > 0, "max_stories_per_agent must be at least 1");
        self.max_stories_per_agent = Some(cap);
        self
    }
}

/// Partitions PRDs using the specialist registry.
#[derive(Debug, Clone, Default)]
pub struct Decomposer {
    registry: Arc<SpecialistRegistry>,
}

impl Decomposer {
    pub fn new(registry: Arc<SpecialistRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SpecialistRegistry {
        &self.registry
    }

    /// Split `prd` into sub-PRDs.
    ///
    /// Every story lands in exactly one sub-PRD. A PRD without stories yields
    /// no sub-PRDs. Groups larger than the cap are cut into contiguous chunks
    /// that keep the group's specialist.
    pub fn decompose_prd(&self, prd: &Prd, options: &DecomposeOptions) -> Vec<SubPrd> {
        if prd.stories.is_empty() {
            return Vec::new();
        }

        let strategy = options.split_by.strategy(options.max_stories_per_agent);
        let groups = strategy.partition(&prd.stories, &self.registry);
        let groups = apply_story_cap(groups, options.max_stories_per_agent);

        let sub_prds: Vec<SubPrd> = groups
            .into_iter()
            .enumerate()
            .map(|(i, group)| {
                let id = format!("{}-sub-{}", prd.id, i + 1);
                let title = format!("{} [{} {}]", prd.title, group.specialist_id, i + 1);
                SubPrd::new(&id, &prd.id, &group.specialist_id, group.stories).with_title(&title)
            })
            .collect();

        tracing::debug!(
            prd = %prd.id,
            strategy = strategy.name(),
            stories = prd.stories.len(),
            sub_prds = sub_prds.len(),
            "decomposed PRD"
        );

        sub_prds
    }
}

/// Cut any group over `cap` stories into contiguous chunks of at most `cap`.
fn apply_story_cap(groups: Vec<StoryGroup>, cap: Option<usize>) -> Vec<StoryGroup> {
    let Some(cap) = cap.filter(|c| *c > 0) else {
        return groups;
    };

    groups
        .into_iter()
        .flat_map(|group| {
            if group.stories.len() <= cap {
                return vec![group];
            }
            group
                .stories
                .chunks(cap)
                .map(|chunk| StoryGroup {
                    specialist_id: group.specialist_id.clone(),
                    stories: chunk.to_vec(),
                })
                .collect()
        })
        .collect()
}

/// Pairwise affected-file overlap between distinct sub-PRDs.
///
/// The result is sorted, so it does not depend on input order.
pub fn analyze_conflicts(sub_prds: &[SubPrd]) -> ConflictAnalysis {
    let files: Vec<(&str, BTreeSet<String>)> = sub_prds
        .iter()
        .map(|s| (s.id.as_str(), s.affected_files()))
        .collect();

    let mut conflicts: BTreeSet<FileConflict> = BTreeSet::new();
    for (i, (id_a, files_a)) in files.iter().enumerate() {
        for (id_b, files_b) in files.iter().skip(i + 1) {
            if id_a == id_b {
                continue;
            }
            for shared in files_a.intersection(files_b) {
                conflicts.insert(FileConflict::new(shared, id_a, id_b));
            }
        }
    }

    let potential_conflicts: Vec<FileConflict> = conflicts.into_iter().collect();
    ConflictAnalysis {
        can_parallelize: potential_conflicts.is_empty(),
        potential_conflicts,
    }
}

/// Story and complexity totals, overall and per assigned specialist.
pub fn estimate_work(sub_prds: &[SubPrd]) -> WorkEstimate {
    let mut estimate = WorkEstimate::default();
    for sub in sub_prds {
        let complexity = sub.total_complexity();
        estimate.total_stories += sub.stories.len();
        estimate.total_complexity += complexity;

        let entry: &mut AgentWork = estimate
            .by_agent
            .entry(sub.assigned_specialist_id.clone())
            .or_default();
        entry.stories += sub.stories.len();
        entry.complexity += complexity;
    }
    estimate
}
