//! Run reports.

use crate::core::{ActionStatus, Artifact, RunState, StageStatus};
use crate::errors::FailureKind;
use crate::utils::elapsed_between;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A push event that starts a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// Repository pushed to.
    pub repository: String,
    /// Branch pushed to.
    pub branch: String,
    /// Head commit after the push.
    pub commit: String,
}

impl Trigger {
    /// Creates a trigger.
    #[must_use]
    pub fn push(
        repository: impl Into<String>,
        branch: impl Into<String>,
        commit: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            branch: branch.into(),
            commit: commit.into(),
        }
    }
}

/// A stored artifact version produced by an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Artifact name.
    pub name: String,
    /// Stored version.
    pub version: u64,
    /// Content digest.
    pub digest: String,
    /// Storage key prefix.
    pub key_prefix: String,
}

impl From<&Artifact> for ArtifactRef {
    fn from(artifact: &Artifact) -> Self {
        Self {
            name: artifact.name.clone(),
            version: artifact.version,
            digest: artifact.digest.clone(),
            key_prefix: artifact.location.key_prefix.clone(),
        }
    }
}

/// The outcome of one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Action name.
    pub name: String,
    /// Action category.
    pub category: String,
    /// Run order within the stage.
    pub run_order: u32,
    /// Final status.
    pub status: ActionStatus,
    /// Failure reason from the collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Artifacts stored.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactRef>,
    /// Variables published.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
    /// Wall time in milliseconds.
    pub duration_ms: f64,
}

/// The outcome of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name.
    pub name: String,
    /// Stage ordinal.
    pub ordinal: usize,
    /// Final status.
    pub status: StageStatus,
    /// Results of the actions that ran.
    #[serde(default)]
    pub actions: Vec<ActionResult>,
    /// Wall time in milliseconds.
    pub duration_ms: f64,
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopReason {
    /// Stage that failed.
    pub stage: String,
    /// Action that failed.
    pub action: String,
    /// Failure classification.
    pub kind: FailureKind,
    /// Reason reported by the failing collaborator.
    pub reason: String,
}

/// The full record of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Run id.
    pub run_id: String,
    /// Pipeline name.
    pub pipeline: String,
    /// The trigger that started the run.
    pub trigger: Trigger,
    /// Final state.
    pub state: RunState,
    /// One entry per stage, in order.
    pub stages: Vec<StageResult>,
    /// Set when the run stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    /// Every state the run visited.
    pub transitions: Vec<RunState>,
    /// Variables published during the run, by namespace.
    #[serde(default)]
    pub variables: BTreeMap<String, BTreeMap<String, String>>,
    /// Run start (ISO 8601).
    pub started_at: String,
    /// Run end (ISO 8601).
    pub finished_at: String,
}

impl RunReport {
    /// Returns true only when every stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Returns a stage result by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Returns an action result by name.
    #[must_use]
    pub fn action(&self, name: &str) -> Option<&ActionResult> {
        self.stages
            .iter()
            .flat_map(|s| s.actions.iter())
            .find(|a| a.name == name)
    }

    /// Returns true if the action was started during the run.
    #[must_use]
    pub fn ran(&self, action: &str) -> bool {
        self.action(action).is_some()
    }

    /// Returns the name of the stage the run stopped at.
    #[must_use]
    pub fn stopped_at(&self) -> Option<&str> {
        self.stop_reason.as_ref().map(|r| r.stage.as_str())
    }

    /// Wall time of the run in milliseconds.
    #[must_use]
    pub fn wall_time_ms(&self) -> Option<i64> {
        elapsed_between(&self.started_at, &self.finished_at)
    }

    /// Renders the report as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(state: RunState, stop_reason: Option<StopReason>) -> RunReport {
        RunReport {
            run_id: "run-1".to_string(),
            pipeline: "p".to_string(),
            trigger: Trigger::push("repo", "main", "abc123"),
            state,
            stages: vec![StageResult {
                name: "Source".to_string(),
                ordinal: 0,
                status: StageStatus::Succeeded,
                actions: vec![ActionResult {
                    name: "CodeCommit_Source".to_string(),
                    category: "Source".to_string(),
                    run_order: 1,
                    status: ActionStatus::Succeeded,
                    error: None,
                    artifacts: Vec::new(),
                    variables: BTreeMap::new(),
                    duration_ms: 1.0,
                }],
                duration_ms: 1.0,
            }],
            stop_reason,
            transitions: vec![RunState::Pending],
            variables: BTreeMap::new(),
            started_at: "2024-01-01T00:00:00+00:00".to_string(),
            finished_at: "2024-01-01T00:00:01+00:00".to_string(),
        }
    }

    #[test]
    fn test_only_completed_is_success() {
        assert!(report(RunState::Completed, None).is_success());
        let stopped = report(
            RunState::Stopped { stage: 1 },
            Some(StopReason {
                stage: "Build".to_string(),
                action: "CDK_Synth".to_string(),
                kind: FailureKind::BuildGate,
                reason: "scan failed".to_string(),
            }),
        );
        assert!(!stopped.is_success());
        assert_eq!(stopped.stopped_at(), Some("Build"));
    }

    #[test]
    fn test_lookup() {
        let report = report(RunState::Completed, None);
        assert!(report.ran("CodeCommit_Source"));
        assert!(!report.ran("CDK_Synth"));
        assert_eq!(report.stage("Source").unwrap().status, StageStatus::Succeeded);
        assert_eq!(report.wall_time_ms(), Some(1000));
    }

    #[test]
    fn test_json_round_trip() {
        let report = report(RunState::Completed, None);
        let json = report.to_json().unwrap();
        let parsed: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }
}
