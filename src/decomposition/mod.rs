//! Decomposition of PRDs into independently executable sub-PRDs.
//!
//! This module provides:
//!
//! - **Strategies**: `domain`, `complexity` and `dependency` partitioning
//!   behind the [`PartitionStrategy`] trait
//! - **Capping**: groups over `max_stories_per_agent` are split into
//!   contiguous chunks, whatever the strategy
//! - **Analysis**: pairwise file conflicts and work estimates over a set of
//!   sub-PRDs
//!
//! ## Example
//!
//! ```
//! use prdforge::decomposition::{DecomposeOptions, Decomposer, SplitBy, estimate_work};
//! use prdforge::prd::{Prd, Story};
//! use prdforge::specialists::Domain;
//!
//! let prd = Prd::new("prd-1", "Profile")
//!     .add_story(Story::new("S-1", "Avatar upload").with_domain(Domain::Ui))
//!     .add_story(Story::new("S-2", "Profile endpoint").with_domain(Domain::Api));
//!
//! let decomposer = Decomposer::default();
//! let subs = decomposer.decompose_prd(&prd, &DecomposeOptions::new(SplitBy::Domain));
//! assert_eq!(subs.len(), 2);
//! assert_eq!(estimate_work(&subs).total_stories, 2);
//! ```

mod decomposer;
mod strategy;
mod types;

pub use decomposer::{DecomposeOptions, Decomposer, analyze_conflicts, estimate_work};
pub use strategy::{
    ComplexityStrategy, DEFAULT_TARGET_COMPLEXITY, DependencyStrategy, DomainStrategy,
    PartitionStrategy, SplitBy, StoryGroup,
};
pub use types::{AgentWork, ConflictAnalysis, FileConflict, SubPrd, SubPrdStatus, WorkEstimate};
