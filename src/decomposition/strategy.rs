//! Partition strategies: how a PRD's stories are grouped before capping.

use crate::errors::ConfigError;
use crate::prd::Story;
use crate::specialists::{Domain, SpecialistRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Complexity one agent is expected to absorb when balancing by complexity.
pub const DEFAULT_TARGET_COMPLEXITY: u32 = 8;

/// Stories headed for one specialist, in PRD order.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryGroup {
    pub specialist_id: String,
    pub stories: Vec<Story>,
}

/// Uniform contract every decomposition strategy implements.
///
/// Implementations must return every input story exactly once and keep PRD
/// order inside each group.
pub trait PartitionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn partition(&self, stories: &[Story], registry: &SpecialistRegistry) -> Vec<StoryGroup>;
}

/// Selectable decomposition strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitBy {
    #[default]
    Domain,
    Complexity,
    Dependency,
}

impl SplitBy {
    /// Build the strategy implementation for this variant.
    pub fn strategy(&self, max_stories_per_agent: Option<usize>) -> Box<dyn PartitionStrategy> {
        match self {
            Self::Domain => Box::new(DomainStrategy),
            Self::Complexity => Box::new(ComplexityStrategy {
                target_complexity: DEFAULT_TARGET_COMPLEXITY,
                max_stories_per_agent,
            }),
            Self::Dependency => Box::new(DependencyStrategy),
        }
    }
}

impl std::fmt::Display for SplitBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Domain => write!(f, "domain"),
            Self::Complexity => write!(f, "complexity"),
            Self::Dependency => write!(f, "dependency"),
        }
    }
}

impl FromStr for SplitBy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "domain" => Ok(Self::Domain),
            "complexity" => Ok(Self::Complexity),
            "dependency" | "dependencies" => Ok(Self::Dependency),
            _ => Err(ConfigError::UnknownSplitStrategy(s.to_string())),
        }
    }
}

/// One group per observed specialist domain, in order of first appearance.
///
/// A domain served by several specialists (a configured one shadowing a
/// built-in) still forms one group, owned by the first specialist the
/// registry lists for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainStrategy;

impl PartitionStrategy for DomainStrategy {
    fn name(&self) -> &'static str {
        "domain"
    }

    fn partition(&self, stories: &[Story], registry: &SpecialistRegistry) -> Vec<StoryGroup> {
        let mut groups: Vec<(Domain, StoryGroup)> = Vec::new();
        for story in stories {
            let domain = &registry.determine_specialist(story).domain;
            match groups.iter_mut().find(|(d, _)| d == domain) {
                Some((_, group)) => group.stories.push(story.clone()),
                None => {
                    let owner = registry
                        .get_specialist_by_domain(domain)
                        .unwrap_or_else(|| registry.fallback());
                    groups.push((
                        domain.clone(),
                        StoryGroup {
                            specialist_id: owner.id.clone(),
                            stories: vec![story.clone()],
                        },
                    ));
                }
            }
        }
        groups.into_iter().map(|(_, group)| group).collect()
    }
}

/// Greedy balance of summed complexity across a derived number of groups.
#[derive(Debug, Clone, Copy)]
pub struct ComplexityStrategy {
    pub target_complexity: u32,
    pub max_stories_per_agent: Option<usize>,
}

impl ComplexityStrategy {
    /// `max(ceil(total / target), ceil(stories / cap))`, clamped to `[1, stories]`.
    pub fn group_count(&self, stories: &[Story]) -> usize {
        if stories.is_empty() {
            return 0;
        }
        let total: u32 = stories.iter().map(|s| u32::from(s.complexity)).sum();
        let by_complexity = total.div_ceil(self.target_complexity.max(1)) as usize;
        let by_cap = self
            .max_stories_per_agent
            .map(|cap| stories.len().div_ceil(cap.max(1)))
            .unwrap_or(1);
        by_complexity.max(by_cap).clamp(1, stories.len())
    }
}

impl PartitionStrategy for ComplexityStrategy {
    fn name(&self) -> &'static str {
        "complexity"
    }

    fn partition(&self, stories: &[Story], registry: &SpecialistRegistry) -> Vec<StoryGroup> {
        let count = self.group_count(stories);
        let mut bins: Vec<(u32, Vec<Story>)> = vec![(0, Vec::new()); count];

        for story in stories {
            // Lightest bin; `min_by_key` keeps the first on ties.
            if let Some(bin) = bins.iter_mut().min_by_key(|bin| bin.0) {
                bin.0 += u32::from(story.complexity);
                bin.1.push(story.clone());
            }
        }

        bins.into_iter()
            .filter(|(_, members)| !members.is_empty())
            .map(|(_, members)| StoryGroup {
                specialist_id: plurality_specialist(&members, registry),
                stories: members,
            })
            .collect()
    }
}

/// Connected components of stories linked by shared affected files.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyStrategy;

impl PartitionStrategy for DependencyStrategy {
    fn name(&self) -> &'static str {
        "dependency"
    }

    fn partition(&self, stories: &[Story], registry: &SpecialistRegistry) -> Vec<StoryGroup> {
        let mut sets = UnionFind::new(stories.len());
        let mut first_owner: HashMap<&str, usize> = HashMap::new();

        for (index, story) in stories.iter().enumerate() {
            for file in &story.affected_files {
                match first_owner.get(file.as_str()) {
                    Some(&owner) => sets.union(owner, index),
                    None => {
                        first_owner.insert(file.as_str(), index);
                    }
                }
            }
        }

        // Components ordered by their first story.
        let mut order: Vec<usize> = Vec::new();
        let mut members: HashMap<usize, Vec<Story>> = HashMap::new();
        for (index, story) in stories.iter().enumerate() {
            let root = sets.find(index);
            members
                .entry(root)
                .or_insert_with(|| {
                    order.push(root);
                    Vec::new()
                })
                .push(story.clone());
        }

        order
            .into_iter()
            .filter_map(|root| members.remove(&root))
            .map(|component| StoryGroup {
                specialist_id: plurality_specialist(&component, registry),
                stories: component,
            })
            .collect()
    }
}

/// Most common specialist among the stories; ties go to the first seen.
fn plurality_specialist(stories: &[Story], registry: &SpecialistRegistry) -> String {
    let mut tally: Vec<(String, usize)> = Vec::new();
    for story in stories {
        let id = &registry.determine_specialist(story).id;
        match tally.iter_mut().find(|(seen, _)| seen == id) {
            Some((_, votes)) => *votes += 1,
            None => tally.push((id.clone(), 1)),
        }
    }

    let mut best: Option<(String, usize)> = None;
    for (id, votes) in tally {
        if best.as_ref().is_none_or(|(_, top)| votes > *top) {
            best = Some((id, votes));
        }
    }

    best.map(|(id, _)| id)
        .unwrap_or_else(|| registry.fallback().id.clone())
}

/// Disjoint-set forest with path compression and union by rank.
#[derive(Debug, Clone)]
pub(crate) struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    pub(crate) fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    pub(crate) fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}
