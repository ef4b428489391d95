//! Stage and action specifications.

use crate::errors::FailureKind;
use crate::iam::{AccountRoles, Arn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// A template inside an artifact, addressed by file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplatePath {
    /// Artifact holding the template.
    pub artifact: String,
    /// Template file name.
    pub file: String,
}

impl TemplatePath {
    /// Creates a template path.
    #[must_use]
    pub fn new(artifact: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            file: file.into(),
        }
    }
}

impl fmt::Display for TemplatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.artifact, self.file)
    }
}

/// A stack deployment into one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployAction {
    /// Stack to create or update.
    pub stack_name: String,
    /// Template to apply.
    pub template: TemplatePath,
    /// Target region.
    pub region: String,
    /// Roles of the target account.
    pub roles: AccountRoles,
    /// Acknowledged capabilities.
    pub capabilities: Vec<String>,
}

impl DeployAction {
    /// Returns the target account.
    #[must_use]
    pub fn account_id(&self) -> &str {
        &self.roles.account_id
    }
}

/// What an action does.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    /// Fetch the latest commit of a branch.
    Source {
        /// Repository name.
        repository: String,
        /// Tracked branch.
        branch: String,
    },
    /// Run the build project.
    Build,
    /// Apply a template.
    Deploy(Box<DeployAction>),
    /// Run a workflow and wait for its outcome.
    Invoke {
        /// Workflow to run.
        state_machine_arn: Arn,
        /// Execution input; may hold `#{Namespace.Key}` references.
        input: serde_json::Value,
    },
    /// Wait for a human decision.
    Approve {
        /// How long the approval may stay pending.
        timeout: Duration,
    },
}

impl ActionKind {
    /// Returns the category name of the action.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Source { .. } => "Source",
            Self::Build => "Build",
            Self::Deploy(_) => "Deploy",
            Self::Invoke { .. } => "Invoke",
            Self::Approve { .. } => "Approval",
        }
    }

    /// Returns how a failure of this action is classified.
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Source { .. } => FailureKind::Source,
            Self::Build => FailureKind::BuildGate,
            Self::Deploy(_) => FailureKind::Deployment,
            Self::Invoke { .. } => FailureKind::TestGate,
            Self::Approve { .. } => FailureKind::Approval,
        }
    }
}

/// A unit of work within a stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpec {
    /// Action name, unique within the pipeline.
    pub name: String,
    /// Position within the stage; equal run orders execute concurrently.
    pub run_order: u32,
    /// What the action does.
    pub kind: ActionKind,
    /// Artifacts consumed.
    pub input_artifacts: Vec<String>,
    /// Artifacts produced.
    pub output_artifacts: Vec<String>,
    /// Variable namespace the action publishes into.
    pub namespace: Option<String>,
}

impl ActionSpec {
    fn new(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            name: name.into(),
            run_order: 1,
            kind,
            input_artifacts: Vec::new(),
            output_artifacts: Vec::new(),
            namespace: None,
        }
    }

    /// A source action emitting `output`.
    #[must_use]
    pub fn source(
        name: impl Into<String>,
        repository: impl Into<String>,
        branch: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            ActionKind::Source {
                repository: repository.into(),
                branch: branch.into(),
            },
        )
        .with_output(output)
    }

    /// A build action turning `input` into `output`.
    #[must_use]
    pub fn build(name: impl Into<String>, input: impl Into<String>, output: impl Into<String>) -> Self {
        Self::new(name, ActionKind::Build)
            .with_input(input)
            .with_output(output)
    }

    /// A deploy action reading its template's artifact.
    #[must_use]
    pub fn deploy(name: impl Into<String>, deploy: DeployAction) -> Self {
        let input = deploy.template.artifact.clone();
        Self::new(name, ActionKind::Deploy(Box::new(deploy))).with_input(input)
    }

    /// A workflow invocation.
    #[must_use]
    pub fn invoke(name: impl Into<String>, state_machine_arn: Arn, input: serde_json::Value) -> Self {
        Self::new(
            name,
            ActionKind::Invoke {
                state_machine_arn,
                input,
            },
        )
    }

    /// A manual approval.
    #[must_use]
    pub fn approve(name: impl Into<String>, timeout: Duration) -> Self {
        Self::new(name, ActionKind::Approve { timeout })
    }

    /// Sets the run order.
    #[must_use]
    pub fn with_run_order(mut self, run_order: u32) -> Self {
        self.run_order = run_order;
        self
    }

    /// Sets the published variable namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Adds an input artifact.
    #[must_use]
    pub fn with_input(mut self, artifact: impl Into<String>) -> Self {
        self.input_artifacts.push(artifact.into());
        self
    }

    /// Adds an output artifact.
    #[must_use]
    pub fn with_output(mut self, artifact: impl Into<String>) -> Self {
        self.output_artifacts.push(artifact.into());
        self
    }

    /// Returns the deployment, if this is a deploy action.
    #[must_use]
    pub fn as_deploy(&self) -> Option<&DeployAction> {
        match &self.kind {
            ActionKind::Deploy(deploy) => Some(deploy),
            _ => None,
        }
    }

    /// Renders the action for inspection and comparison.
    #[must_use]
    pub fn to_manifest(&self) -> serde_json::Value {
        let mut manifest = serde_json::json!({
            "name": self.name,
            "category": self.kind.category(),
            "run_order": self.run_order,
            "input_artifacts": self.input_artifacts,
            "output_artifacts": self.output_artifacts,
            "namespace": self.namespace,
        });
        let configuration = match &self.kind {
            ActionKind::Source { repository, branch } => serde_json::json!({
                "repository": repository,
                "branch": branch,
            }),
            ActionKind::Build => serde_json::json!({}),
            ActionKind::Deploy(deploy) => serde_json::json!({
                "stack_name": deploy.stack_name,
                "template_path": deploy.template.to_string(),
                "account_id": deploy.account_id(),
                "region": deploy.region,
                "deployment_role": deploy.roles.deployment_role.arn,
                "action_role": deploy.roles.action_role.arn,
                "capabilities": deploy.capabilities,
            }),
            ActionKind::Invoke {
                state_machine_arn,
                input,
            } => serde_json::json!({
                "state_machine_arn": state_machine_arn,
                "input": input,
            }),
            ActionKind::Approve { timeout } => serde_json::json!({
                "timeout_secs": timeout.as_secs(),
            }),
        };
        manifest["configuration"] = configuration;
        manifest
    }
}

/// An ordered phase of the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    /// Stage name.
    pub name: String,
    /// Zero-based position in the pipeline; assigned by the builder.
    pub ordinal: usize,
    /// Actions in the stage.
    pub actions: Vec<ActionSpec>,
    /// Stage that must succeed first.
    pub predecessor: Option<String>,
}

impl StageSpec {
    /// Creates an empty stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ordinal: 0,
            actions: Vec::new(),
            predecessor: None,
        }
    }

    /// Sets the predecessor stage.
    #[must_use]
    pub fn after(mut self, predecessor: impl Into<String>) -> Self {
        self.predecessor = Some(predecessor.into());
        self
    }

    /// Adds an action.
    #[must_use]
    pub fn with_action(mut self, action: ActionSpec) -> Self {
        self.actions.push(action);
        self
    }

    /// Returns an action by name.
    #[must_use]
    pub fn action(&self, name: &str) -> Option<&ActionSpec> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Groups the actions by run order, lowest first. Within a group,
    /// declaration order is kept.
    #[must_use]
    pub fn run_order_groups(&self) -> BTreeMap<u32, Vec<&ActionSpec>> {
        let mut groups: BTreeMap<u32, Vec<&ActionSpec>> = BTreeMap::new();
        for action in &self.actions {
            groups.entry(action.run_order).or_default().push(action);
        }
        groups
    }

    /// Returns true if any action matches.
    #[must_use]
    pub fn has_action(&self, predicate: impl Fn(&ActionKind) -> bool) -> bool {
        self.actions.iter().any(|a| predicate(&a.kind))
    }

    /// Renders the stage for inspection and comparison.
    #[must_use]
    pub fn to_manifest(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "ordinal": self.ordinal,
            "predecessor": self.predecessor,
            "actions": self.actions.iter().map(ActionSpec::to_manifest).collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_order_groups() {
        let stage = StageSpec::new("Integration_Test")
            .with_action(ActionSpec::approve("c", Duration::from_secs(1)).with_run_order(2))
            .with_action(ActionSpec::approve("a", Duration::from_secs(1)))
            .with_action(ActionSpec::approve("b", Duration::from_secs(1)));

        let groups = stage.run_order_groups();
        let order: Vec<(u32, Vec<&str>)> = groups
            .iter()
            .map(|(k, v)| (*k, v.iter().map(|a| a.name.as_str()).collect()))
            .collect();
        assert_eq!(order, vec![(1, vec!["a", "b"]), (2, vec!["c"])]);
    }

    #[test]
    fn test_action_builders() {
        let source = ActionSpec::source("CodeCommit_Source", "repo", "main", "SourceArtifact");
        assert_eq!(source.output_artifacts, vec!["SourceArtifact".to_string()]);
        assert_eq!(source.run_order, 1);
        assert_eq!(source.kind.failure_kind(), FailureKind::Source);

        let build = ActionSpec::build("CDK_Synth", "SourceArtifact", "CdkBuildOutput");
        assert_eq!(build.input_artifacts, vec!["SourceArtifact".to_string()]);
        assert_eq!(build.kind.category(), "Build");
        assert!(build.as_deploy().is_none());
    }

    #[test]
    fn test_manifest_includes_configuration() {
        let approve = ActionSpec::approve("Deploy_to_Prod", Duration::from_secs(60));
        let manifest = approve.to_manifest();
        assert_eq!(manifest["category"], "Approval");
        assert_eq!(manifest["configuration"]["timeout_secs"], 60);
    }
}
