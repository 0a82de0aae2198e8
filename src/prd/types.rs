//! Core PRD types: a titled set of stories handed to the orchestrator.

use crate::specialists::Domain;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a PRD as tracked by whoever authored it.
///
/// The orchestrator never changes this; it is carried through for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrdStatus {
    #[default]
    Draft,
    Approved,
    InProgress,
    Completed,
    Failed,
}

/// One discrete requirement of a PRD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// Files this story is expected to touch.
    #[serde(default)]
    pub affected_files: Vec<String>,
    /// Relative effort, 1 (trivial) to 5 (hard).
    #[serde(default = "default_complexity")]
    pub complexity: u8,
    /// Explicit domain tag; when absent the registry infers one from files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Domain>,
}

fn default_complexity() -> u8 {
    1
}

impl Story {
    /// Create a story with complexity 1 and no files.
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            acceptance_criteria: Vec::new(),
            affected_files: Vec::new(),
            complexity: default_complexity(),
            domain: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_acceptance_criteria(mut self, criteria: Vec<String>) -> Self {
        self.acceptance_criteria = criteria;
        self
    }

    pub fn with_files<S: Into<String>>(mut self, files: impl IntoIterator<Item = S>) -> Self {
        self.affected_files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_complexity(mut self, complexity: u8) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = Some(domain);
        self
    }
}

/// Product Requirements Document: the unit of work submitted for orchestration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prd {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    /// Order is significant: decomposition preserves it inside every group.
    #[serde(default)]
    pub stories: Vec<Story>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: PrdStatus,
}

impl Prd {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            summary: String::new(),
            stories: Vec::new(),
            created_at: Utc::now(),
            status: PrdStatus::Draft,
        }
    }

    pub fn with_summary(mut self, summary: &str) -> Self {
        self.summary = summary.to_string();
        self
    }

    pub fn with_stories(mut self, stories: Vec<Story>) -> Self {
        self.stories = stories;
        self
    }

    pub fn add_story(mut self, story: Story) -> Self {
        self.stories.push(story);
        self
    }

    /// Sum of story complexities.
    pub fn total_complexity(&self) -> u32 {
        self.stories.iter().map(|s| u32::from(s.complexity)).sum()
    }

    pub fn story(&self, id: &str) -> Option<&Story> {
        self.stories.iter().find(|s| s.id == id)
    }
}
