//! Session lifecycle states and the legal transitions between them.

use serde::{Deserialize, Serialize};

/// Status of an orchestration session.
///
/// ```text
/// decomposing -> executing -> merging -> verifying -> completed
///      \             \           \           \
///       +-------------+-----------+-----------+-----> failed
/// ```
///
/// A cancelled session reports `Failed` with the session's `cancelled` flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Decomposing,
    Executing,
    Merging,
    Verifying,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (Decomposing, Executing)
            | (Executing, Merging)
            | (Merging, Verifying)
            | (Verifying, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decomposing => "decomposing",
            Self::Executing => "executing",
            Self::Merging => "merging",
            Self::Verifying => "verifying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::SessionStatus::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(Decomposing.can_transition_to(Executing));
        assert!(Executing.can_transition_to(Merging));
        assert!(Merging.can_transition_to(Verifying));
        assert!(Verifying.can_transition_to(Completed));
    }

    #[test]
    fn test_failed_reachable_from_non_terminal_only() {
        for state in [Decomposing, Executing, Merging, Verifying] {
            assert!(state.can_transition_to(Failed), "{state}");
        }
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Failed));
    }

    #[test]
    fn test_skips_and_reversals_are_rejected() {
        assert!(!Decomposing.can_transition_to(Merging));
        assert!(!Executing.can_transition_to(Completed));
        assert!(!Verifying.can_transition_to(Executing));
        assert!(!Completed.can_transition_to(Executing));
        assert!(!Failed.can_transition_to(Executing));
    }

    #[test]
    fn test_terminal_and_serde() {
        assert!(Completed.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Merging.is_terminal());
        assert_eq!(serde_json::to_string(&Verifying).unwrap(), "\"verifying\"");
    }
}
