//! Typed error hierarchy for the prdforge orchestrator.
//!
//! Three top-level enums cover the three places misuse can surface:
//! - `PrdError`: loading and validating a PRD document
//! - `ConfigError`: invalid orchestrator configuration or option strings
//! - `OrchestratorError`: session lookups and lifecycle transitions
//!
//! Runtime outcomes (unit failures, merge conflicts, failed verification) are
//! not errors; they are reported through result objects.

use crate::session::SessionStatus;
use thiserror::Error;

/// Errors from reading or validating a PRD.
#[derive(Debug, Error)]
pub enum PrdError {
    #[error("Failed to read PRD file at {path}: {source}")]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse PRD JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse PRD YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Story at position {index} has an empty id")]
    EmptyStoryId { index: usize },

    #[error("Duplicate story id '{id}'")]
    DuplicateStoryId { id: String },

    #[error("Story '{id}' has complexity {complexity}, expected 1..=5")]
    ComplexityOutOfRange { id: String, complexity: u8 },
}

/// Errors from orchestrator configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_concurrent must be at least 1, got {0}")]
    InvalidMaxConcurrent(usize),

    #[error("max_stories_per_agent must be at least 1")]
    InvalidStoriesCap,

    #[error("unit_timeout must be greater than zero")]
    InvalidUnitTimeout,

    #[error("verification timeout_secs must be greater than zero")]
    InvalidTestTimeout,

    #[error("Unknown split strategy '{0}'. Valid values: domain, complexity, dependency")]
    UnknownSplitStrategy(String),

    #[error("Unknown merge mode '{0}'. Valid values: strict, last_writer_wins")]
    UnknownMergeMode(String),

    #[error("Unknown conflict policy '{0}'. Valid values: serialize, advisory")]
    UnknownConflictPolicy(String),

    #[error("Invalid file pattern '{pattern}' for specialist '{specialist}': {message}")]
    InvalidPattern {
        specialist: String,
        pattern: String,
        message: String,
    },

    #[error("No {setting} configured; set it in prdforge.toml or pass it on the command line")]
    MissingCommand { setting: &'static str },

    #[error("Invalid value '{value}' for {key}")]
    InvalidEnvValue { key: String, value: String },

    #[error("Failed to read config file at {path}: {source}")]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    ParseFailed {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Errors from the session lifecycle.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Session {id} not found")]
    SessionNotFound { id: String },

    #[error("Session {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Session {id} has no successful merge to verify")]
    MergeRequired { id: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
