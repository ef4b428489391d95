//! Action output type with factory methods.

use super::{ActionStatus, ArtifactFiles};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The result a collaborator reports for one action.
///
/// Failures are values, not errors: the reason string is surfaced verbatim
/// on the run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutput {
    /// The status of the action.
    pub status: ActionStatus,

    /// Files for the action's output artifact, if it produces one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<ArtifactFiles>,

    /// Named string outputs published to the action's variable namespace.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,

    /// Additional metadata (e.g. execution ids).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,

    /// Failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for ActionOutput {
    fn default() -> Self {
        Self::ok()
    }
}

impl ActionOutput {
    fn with_status(status: ActionStatus, error: Option<String>) -> Self {
        Self {
            status,
            files: None,
            variables: BTreeMap::new(),
            metadata: BTreeMap::new(),
            error,
        }
    }

    /// Creates a successful output with nothing attached.
    #[must_use]
    pub fn ok() -> Self {
        Self::with_status(ActionStatus::Succeeded, None)
    }

    /// Creates a successful output carrying artifact files.
    #[must_use]
    pub fn ok_with_files(files: ArtifactFiles) -> Self {
        Self {
            files: Some(files),
            ..Self::ok()
        }
    }

    /// Creates a successful output publishing variables.
    #[must_use]
    pub fn ok_with_variables(variables: BTreeMap<String, String>) -> Self {
        Self {
            variables,
            ..Self::ok()
        }
    }

    /// Creates a failed output.
    #[must_use]
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::with_status(ActionStatus::Failed, Some(reason.into()))
    }

    /// Creates a rejected-approval output.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::with_status(ActionStatus::Rejected, Some(reason.into()))
    }

    /// Creates an expired-approval output.
    #[must_use]
    pub fn timed_out(reason: impl Into<String>) -> Self {
        Self::with_status(ActionStatus::TimedOut, Some(reason.into()))
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Adds a published variable.
    #[must_use]
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Returns true if the action succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns the failure reason, or a placeholder for failures reported
    /// without one.
    #[must_use]
    pub fn reason(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| format!("action {}", self.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_variants() {
        assert!(ActionOutput::ok().is_success());
        assert!(ActionOutput::default().files.is_none());

        let out = ActionOutput::ok().with_variable("KinesisInputStreamName", "X");
        assert_eq!(out.variables.get("KinesisInputStreamName"), Some(&"X".to_string()));
    }

    #[test]
    fn test_failure_variants() {
        let out = ActionOutput::fail("template rejected");
        assert_eq!(out.status, ActionStatus::Failed);
        assert_eq!(out.reason(), "template rejected");

        assert_eq!(ActionOutput::rejected("no").status, ActionStatus::Rejected);
        assert_eq!(ActionOutput::timed_out("late").status, ActionStatus::TimedOut);
    }

    #[test]
    fn test_reason_placeholder() {
        let out = ActionOutput {
            error: None,
            ..ActionOutput::fail("x")
        };
        assert_eq!(out.reason(), "action failed");
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let json = serde_json::to_value(ActionOutput::ok()).unwrap();
        assert_eq!(json, serde_json::json!({"status": "succeeded"}));
    }
}
