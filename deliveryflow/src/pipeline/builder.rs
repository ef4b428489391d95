//! Pipeline builder with validation.

use super::{ActionKind, ActionSpec, StageGraph, StageSpec};
use super::variables::references;
use crate::errors::{ContractErrorInfo, ContractSuggestions, PipelineValidationError};
use std::collections::HashSet;

/// Builder for linear, validated stage graphs.
///
/// Stages are checked as they are added: each must name the stage added
/// just before it as its predecessor, and every artifact or variable
/// namespace an action consumes must be produced by an action that runs
/// earlier.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    home_account_id: String,
    stages: Vec<StageSpec>,
    action_names: HashSet<String>,
    artifacts: HashSet<String>,
    namespaces: HashSet<String>,
}

impl PipelineBuilder {
    /// Creates a builder for a pipeline running in `home_account_id`.
    /// Deployments into any other account are promotions and must be gated.
    #[must_use]
    pub fn new(name: impl Into<String>, home_account_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            home_account_id: home_account_id.into(),
            stages: Vec::new(),
            action_names: HashSet::new(),
            artifacts: HashSet::new(),
            namespaces: HashSet::new(),
        }
    }

    /// Appends a stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage breaks the graph's contracts.
    pub fn stage(mut self, spec: StageSpec) -> Result<Self, PipelineValidationError> {
        self.add_stage(spec)?;
        Ok(self)
    }

    /// Appends a stage in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage breaks the graph's contracts.
    pub fn add_stage(&mut self, mut spec: StageSpec) -> Result<(), PipelineValidationError> {
        if self.stages.iter().any(|s| s.name == spec.name) {
            return Err(contract_error(
                "CONTRACT-004-CONFLICT",
                format!("Stage '{}' is defined twice", spec.name),
                vec![spec.name.clone()],
            ));
        }

        let expected = self.stages.last().map(|s| s.name.clone());
        if spec.predecessor != expected {
            return Err(contract_error(
                "CONTRACT-004-MISSING_DEP",
                format!(
                    "Stage '{}' must follow '{}' but names '{}'",
                    spec.name,
                    expected.as_deref().unwrap_or("<none>"),
                    spec.predecessor.as_deref().unwrap_or("<none>"),
                ),
                vec![spec.name.clone()],
            ));
        }

        if spec.actions.is_empty() {
            return Err(contract_error(
                "CONTRACT-004-EMPTY",
                format!("Stage '{}' has no actions", spec.name),
                vec![spec.name.clone()],
            ));
        }

        let mut stage_artifacts = HashSet::new();
        let mut stage_namespaces = HashSet::new();
        for (run_order, group) in spec.run_order_groups() {
            if run_order == 0 {
                return Err(contract_error(
                    "CONTRACT-004-RUN_ORDER",
                    format!("Stage '{}' has an action with run order 0", spec.name),
                    vec![spec.name.clone()],
                ));
            }
            // Outputs of one run-order group are visible to later groups only.
            let mut produced = Vec::new();
            let mut published = Vec::new();
            for action in group {
                self.check_action(&spec.name, action, &stage_artifacts, &stage_namespaces)?;
                produced.extend(action.output_artifacts.iter().cloned());
                published.extend(action.namespace.iter().cloned());
            }
            stage_artifacts.extend(produced);
            stage_namespaces.extend(published);
        }

        self.artifacts.extend(stage_artifacts);
        self.namespaces.extend(stage_namespaces);
        spec.ordinal = self.stages.len();
        self.stages.push(spec);
        Ok(())
    }

    fn check_action(
        &mut self,
        stage: &str,
        action: &ActionSpec,
        stage_artifacts: &HashSet<String>,
        stage_namespaces: &HashSet<String>,
    ) -> Result<(), PipelineValidationError> {
        if !self.action_names.insert(action.name.clone()) {
            return Err(contract_error(
                "CONTRACT-004-CONFLICT",
                format!("Action '{}' is defined twice", action.name),
                vec![stage.to_string()],
            ));
        }

        for input in &action.input_artifacts {
            if !self.artifacts.contains(input) && !stage_artifacts.contains(input) {
                return Err(contract_error(
                    "CONTRACT-005-ARTIFACT",
                    format!(
                        "Action '{}' consumes artifact '{input}' that no earlier action produces",
                        action.name
                    ),
                    vec![stage.to_string()],
                ));
            }
        }

        for output in &action.output_artifacts {
            if self.artifacts.contains(output) || stage_artifacts.contains(output) {
                return Err(contract_error(
                    "CONTRACT-004-CONFLICT",
                    format!("Artifact '{output}' is produced twice"),
                    vec![stage.to_string()],
                ));
            }
        }

        if let Some(namespace) = &action.namespace {
            if self.namespaces.contains(namespace) || stage_namespaces.contains(namespace) {
                return Err(contract_error(
                    "CONTRACT-004-CONFLICT",
                    format!("Namespace '{namespace}' is published twice"),
                    vec![stage.to_string()],
                ));
            }
        }

        if let ActionKind::Invoke { input, .. } = &action.kind {
            for (namespace, key) in references(input) {
                if !self.namespaces.contains(&namespace) && !stage_namespaces.contains(&namespace) {
                    return Err(contract_error(
                        "CONTRACT-005-NAMESPACE",
                        format!(
                            "Action '{}' references '#{{{namespace}.{key}}}' but no earlier action publishes '{namespace}'",
                            action.name
                        ),
                        vec![stage.to_string()],
                    ));
                }
            }
        }
        Ok(())
    }

    /// Builds the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the builder has no stages, or if a deployment
    /// outside the home account is not preceded by a passing integration
    /// test stage and then a manual approval stage.
    pub fn build(self) -> Result<StageGraph, PipelineValidationError> {
        if self.stages.is_empty() {
            return Err(contract_error(
                "CONTRACT-004-EMPTY",
                "Pipeline has no stages".to_string(),
                Vec::new(),
            ));
        }
        check_promotion_gates(&self.home_account_id, &self.stages)?;
        Ok(StageGraph::new(self.name, self.stages))
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

/// Checks that every deployment outside `home_account_id` is reachable
/// only through an invoke stage followed by an approval stage.
///
/// # Errors
///
/// Returns a `CONTRACT-006-GATE` error naming the ungated stage.
pub fn check_promotion_gates(
    home_account_id: &str,
    stages: &[StageSpec],
) -> Result<(), PipelineValidationError> {
    for (index, stage) in stages.iter().enumerate() {
        let promotes = stage
            .actions
            .iter()
            .filter_map(ActionSpec::as_deploy)
            .any(|deploy| deploy.account_id() != home_account_id);
        if !promotes {
            continue;
        }

        let earlier = &stages[..index];
        let test_stage = earlier
            .iter()
            .position(|s| s.has_action(|k| matches!(k, ActionKind::Invoke { .. })));
        let approved = test_stage.is_some_and(|t| {
            earlier[t + 1..]
                .iter()
                .any(|s| s.has_action(|k| matches!(k, ActionKind::Approve { .. })))
        });

        if !approved {
            return Err(contract_error(
                "CONTRACT-006-GATE",
                format!(
                    "Stage '{}' deploys outside account {home_account_id} without an integration test and a manual approval before it",
                    stage.name
                ),
                vec![stage.name.clone()],
            ));
        }
    }
    Ok(())
}

fn contract_error(code: &str, message: String, stages: Vec<String>) -> PipelineValidationError {
    let mut info = ContractErrorInfo::new(code, message.clone());
    if let Some(hint) = ContractSuggestions::get(code) {
        info = info.with_fix_hint(hint);
    }
    PipelineValidationError::new(message)
        .with_stages(stages)
        .with_error_info(info)
}
