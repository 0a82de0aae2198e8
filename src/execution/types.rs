use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Why a single unit did not succeed.
///
/// The `Display` form is `"<kind>: <detail>"` and is what lands in
/// [`ExecutionResult::error`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("timeout: worker did not finish within {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("worker: {0}")]
    Worker(String),

    #[error("cancelled: sub-PRD was not dispatched")]
    Cancelled,
}

impl ExecutionError {
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::Timeout(_) => "timeout",
            ExecutionError::Worker(_) => "worker",
            ExecutionError::Cancelled => "cancelled",
        }
    }
}

/// Outcome of one execution attempt for one sub-PRD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub sub_prd_id: String,
    pub success: bool,
    #[serde(rename = "durationMs", with = "crate::util::duration_ms")]
    pub duration: Duration,
    #[serde(default)]
    pub files_changed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn succeeded(sub_prd_id: impl Into<String>, duration: Duration, files: Vec<String>) -> Self {
        Self {
            sub_prd_id: sub_prd_id.into(),
            success: true,
            duration,
            files_changed: files,
            error: None,
        }
    }

    pub fn failed(sub_prd_id: impl Into<String>, duration: Duration, error: &ExecutionError) -> Self {
        Self {
            sub_prd_id: sub_prd_id.into(),
            success: false,
            duration,
            files_changed: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn cancelled(sub_prd_id: impl Into<String>) -> Self {
        Self::failed(sub_prd_id, Duration::ZERO, &ExecutionError::Cancelled)
    }

    /// The error kind prefix, if this result failed.
    pub fn error_kind(&self) -> Option<&str> {
        self.error
            .as_deref()
            .and_then(|e| e.split_once(':').map(|(kind, _)| kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_rendering_has_kind_prefix() {
        let timeout = ExecutionError::Timeout(Duration::from_millis(1500));
        assert_eq!(timeout.kind(), "timeout");
        assert!(timeout.to_string().starts_with("timeout: "));
        assert!(timeout.to_string().contains("1.5s"));

        let worker = ExecutionError::Worker("exit code 3".into());
        assert_eq!(worker.to_string(), "worker: exit code 3");
        assert_eq!(ExecutionError::Cancelled.kind(), "cancelled");
    }

    #[test]
    fn test_failed_result_kind() {
        let result = ExecutionResult::failed(
            "p-sub-1",
            Duration::from_millis(10),
            &ExecutionError::Worker("boom".into()),
        );
        assert!(!result.success);
        assert_eq!(result.error_kind(), Some("worker"));
        assert!(result.files_changed.is_empty());

        let ok = ExecutionResult::succeeded("p-sub-2", Duration::ZERO, vec!["a.rs".into()]);
        assert_eq!(ok.error_kind(), None);
        assert_eq!(ExecutionResult::cancelled("x").error_kind(), Some("cancelled"));
    }

    #[test]
    fn test_result_wire_shape() {
        let result =
            ExecutionResult::succeeded("p-sub-1", Duration::from_millis(250), vec!["a.rs".into()]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["subPrdId"], "p-sub-1");
        assert_eq!(json["durationMs"], 250);
        assert_eq!(json["filesChanged"][0], "a.rs");
        assert!(json.get("error").is_none());

        let back: ExecutionResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}
