//! Error types for the deliveryflow crate.
//!
//! Two families live here. Assembly-time errors (`ConfigurationError`,
//! `PipelineValidationError`, `VariableError`) reject a pipeline before any
//! run starts. Run-time failures are never raised as errors: they are
//! recorded on the run report as a [`FailureKind`] with a reason string.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The main error type for deliveryflow operations.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// A trust boundary or resource identifier could not be constructed.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// The stage graph is malformed.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A variable namespace reference could not be resolved.
    #[error("{0}")]
    Variable(#[from] VariableError),

    /// A trigger was not accepted by the pipeline.
    #[error("{0}")]
    Trigger(#[from] TriggerError),

    /// The run state machine was driven through an illegal transition.
    #[error("Invalid run transition: {from} on {event}")]
    InvalidTransition {
        /// The state the run was in.
        from: String,
        /// The event that was rejected.
        event: String,
    },

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised when an identifier required for a trust boundary is missing
/// or malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// A required field was empty or absent.
    #[error("Missing required configuration value '{field}'")]
    Missing {
        /// The configuration field name.
        field: String,
    },

    /// A field was present but failed validation.
    #[error("Invalid configuration value for '{field}': '{value}' ({reason})")]
    Invalid {
        /// The configuration field name.
        field: String,
        /// The rejected value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigurationError {
    /// Creates a missing-value error.
    #[must_use]
    pub fn missing(field: impl Into<String>) -> Self {
        Self::Missing {
            field: field.into(),
        }
    }

    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Invalid {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Returns the name of the offending field.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Missing { field } | Self::Invalid { field, .. } => field,
        }
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-006-GATE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when a `#{Namespace.Key}` reference cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VariableError {
    /// No action has published the namespace.
    #[error("Unknown variable namespace '{namespace}'")]
    UnknownNamespace {
        /// The namespace that was referenced.
        namespace: String,
    },

    /// The namespace exists but does not contain the key.
    #[error("Variable '{key}' is not published in namespace '{namespace}'")]
    UnknownKey {
        /// The namespace that was referenced.
        namespace: String,
        /// The missing key.
        key: String,
    },
}

/// Error raised when a source event does not start a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    /// The push targeted a branch the pipeline does not track.
    #[error("Branch '{actual}' is not tracked (pipeline tracks '{expected}')")]
    UntrackedBranch {
        /// The tracked branch.
        expected: String,
        /// The branch that was pushed.
        actual: String,
    },

    /// The push came from another repository.
    #[error("Repository '{actual}' does not feed this pipeline (expected '{expected}')")]
    ForeignRepository {
        /// The pipeline's repository.
        expected: String,
        /// The repository that was pushed.
        actual: String,
    },
}

/// Classification of a run-stopping failure.
///
/// Approval stops are terminal like every other kind; the distinction
/// exists for reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The source revision could not be fetched.
    Source,
    /// Compile or security-scan failure.
    BuildGate,
    /// The target environment rejected a template or update.
    Deployment,
    /// The integration test workflow failed or was unreachable.
    TestGate,
    /// The manual approval was rejected or timed out.
    Approval,
}

impl FailureKind {
    /// Returns true when the stop was caused by a human decision rather
    /// than a technical failure.
    #[must_use]
    pub fn is_approval(&self) -> bool {
        matches!(self, Self::Approval)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::BuildGate => write!(f, "build_gate"),
            Self::Deployment => write!(f, "deployment"),
            Self::TestGate => write!(f, "test_gate"),
            Self::Approval => write!(f, "approval"),
        }
    }
}

/// Provides default suggestions for common contract error codes.
pub struct ContractSuggestions;

impl ContractSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "CONTRACT-004-MISSING_DEP" => Some(
                "Every stage must name the stage directly before it as its predecessor.",
            ),
            "CONTRACT-004-CONFLICT" => Some(
                "Stage, action and artifact names must be unique within a pipeline.",
            ),
            "CONTRACT-004-EMPTY" => Some(
                "Add at least one stage to the pipeline and at least one action to every stage.",
            ),
            "CONTRACT-004-RUN_ORDER" => Some("Action run orders start at 1."),
            "CONTRACT-005-ARTIFACT" => Some(
                "Consume only artifacts produced by an action that runs earlier in the pipeline.",
            ),
            "CONTRACT-005-NAMESPACE" => Some(
                "Reference only namespaces published by a deploy action in an earlier stage.",
            ),
            "CONTRACT-006-GATE" => Some(
                "Production deployments must follow an integration test stage and a manual approval stage.",
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("stage", "Build");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.summary, "Test error");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("stage"), Some(&"Build".to_string()));
    }

    #[test]
    fn test_configuration_error_field() {
        let err = ConfigurationError::missing("prod_account_id");
        assert_eq!(err.field(), "prod_account_id");
        assert!(err.to_string().contains("prod_account_id"));

        let err = ConfigurationError::invalid("region", "Mars", "not a region");
        assert_eq!(err.field(), "region");
        assert!(err.to_string().contains("Mars"));
    }

    #[test]
    fn test_validation_error_code() {
        let err = PipelineValidationError::new("bad gate")
            .with_stages(vec!["Deploy_to_Prod".to_string()])
            .with_error_info(ContractErrorInfo::new("CONTRACT-006-GATE", "gate skipped"));

        assert_eq!(err.code(), Some("CONTRACT-006-GATE"));
        assert_eq!(err.stages, vec!["Deploy_to_Prod".to_string()]);
    }

    #[test]
    fn test_failure_kind_display_and_serde() {
        assert_eq!(FailureKind::BuildGate.to_string(), "build_gate");
        assert!(FailureKind::Approval.is_approval());
        assert!(!FailureKind::TestGate.is_approval());

        let json = serde_json::to_string(&FailureKind::TestGate).unwrap();
        assert_eq!(json, r#""test_gate""#);
    }

    #[test]
    fn test_contract_suggestions() {
        assert!(ContractSuggestions::get("CONTRACT-006-GATE").is_some());
        assert!(ContractSuggestions::get("UNKNOWN").is_none());
    }
}
