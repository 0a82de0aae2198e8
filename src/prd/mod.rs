//! PRD documents: the structured feature requests the orchestrator consumes.
//!
//! A PRD is created outside the orchestrator and is treated as read-only
//! input. This module provides the types plus loading and validation from
//! JSON or YAML files.
//!
//! ## Example
//!
//! ```
//! use prdforge::prd::{Prd, Story};
//!
//! let prd = Prd::from_json(r#"{
//!     "id": "prd-1",
//!     "title": "Checkout",
//!     "stories": [
//!         {"id": "S-1", "title": "Cart page", "affectedFiles": ["src/pages/cart.tsx"], "complexity": 2}
//!     ]
//! }"#).unwrap();
//! assert_eq!(prd.stories.len(), 1);
//! ```

mod types;

pub use types::{Prd, PrdStatus, Story};

use crate::errors::PrdError;
use std::collections::HashSet;
use std::path::Path;

impl Prd {
    /// Parse and validate a PRD from JSON.
    pub fn from_json(content: &str) -> Result<Self, PrdError> {
        let prd: Prd = serde_json::from_str(content)?;
        prd.validate()?;
        Ok(prd)
    }

    /// Parse and validate a PRD from YAML.
    pub fn from_yaml(content: &str) -> Result<Self, PrdError> {
        let prd: Prd = serde_yaml::from_str(content)?;
        prd.validate()?;
        Ok(prd)
    }

    /// Load a PRD file; `.yaml`/`.yml` are read as YAML, everything else as JSON.
    pub fn load(path: &Path) -> Result<Self, PrdError> {
        let content = std::fs::read_to_string(path).map_err(|source| PrdError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;

        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

        if is_yaml {
            Self::from_yaml(&content)
        } else {
            Self::from_json(&content)
        }
    }

    /// Check the structural rules decomposition relies on: non-empty unique
    /// story ids and complexity within 1..=5.
    pub fn validate(&self) -> Result<(), PrdError> {
        let mut seen = HashSet::new();
        for (index, story) in self.stories.iter().enumerate() {
            if story.id.trim().is_empty() {
                return Err(PrdError::EmptyStoryId { index });
            }
            if !seen.insert(story.id.as_str()) {
                return Err(PrdError::DuplicateStoryId {
                    id: story.id.clone(),
                });
            }
            if !(1..=5).contains(&story.complexity) {
                return Err(PrdError::ComplexityOutOfRange {
                    id: story.id.clone(),
                    complexity: story.complexity,
                });
            }
        }
        Ok(())
    }
}
