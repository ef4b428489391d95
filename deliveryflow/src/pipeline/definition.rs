//! The assembled pipeline: stage graph plus the resources it runs against.

use super::StageSpec;
use crate::build::BuildSpec;
use crate::errors::TriggerError;
use crate::iam::AccountRoles;
use crate::resources::{ArtifactStore, DevAccountSetup, EncryptionKey, SourceRepository};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A validated, linear sequence of stages.
#[derive(Debug, Clone, PartialEq)]
pub struct StageGraph {
    name: String,
    stages: Vec<StageSpec>,
}

impl StageGraph {
    pub(crate) fn new(name: String, stages: Vec<StageSpec>) -> Self {
        Self { name, stages }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Returns a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageSpec> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns the total number of actions.
    #[must_use]
    pub fn action_count(&self) -> usize {
        self.stages.iter().map(|s| s.actions.len()).sum()
    }

    /// Renders the graph for inspection and comparison.
    #[must_use]
    pub fn to_manifest(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "stages": self.stages.iter().map(StageSpec::to_manifest).collect::<Vec<_>>(),
        })
    }
}

/// Everything a run needs: the graph, the shared resources and the
/// capabilities of both accounts.
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    /// Stage graph.
    pub graph: StageGraph,
    /// Tracked branch.
    pub branch: String,
    /// Development account resources.
    pub setup: DevAccountSetup,
    /// Development account roles.
    pub dev_roles: AccountRoles,
    /// Production account roles.
    pub prod_roles: AccountRoles,
    /// Build project.
    pub build_spec: Arc<BuildSpec>,
}

impl PipelineDefinition {
    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.graph.name()
    }

    /// Returns the source repository.
    #[must_use]
    pub fn repository(&self) -> &SourceRepository {
        &self.setup.repository
    }

    /// Returns the artifact store.
    #[must_use]
    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.setup.store
    }

    /// Returns the artifact key.
    #[must_use]
    pub fn key(&self) -> &Arc<EncryptionKey> {
        &self.setup.key
    }

    /// Checks that a push event targets this pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error for another repository or an untracked branch.
    pub fn accepts(&self, repository: &str, branch: &str) -> Result<(), TriggerError> {
        if repository != self.setup.repository.name {
            return Err(TriggerError::ForeignRepository {
                expected: self.setup.repository.name.clone(),
                actual: repository.to_string(),
            });
        }
        if branch != self.branch {
            return Err(TriggerError::UntrackedBranch {
                expected: self.branch.clone(),
                actual: branch.to_string(),
            });
        }
        Ok(())
    }

    /// Stack outputs of the pipeline and of the development account setup.
    #[must_use]
    pub fn outputs(&self) -> BTreeMap<String, String> {
        let mut outputs = self.setup.outputs();
        outputs.insert(
            "CfnOutputRepositoryName".to_string(),
            self.setup.repository.name.clone(),
        );
        outputs.insert(
            "CfnOutputCodeCommitHttpUrl".to_string(),
            self.setup.repository.clone_url_http.clone(),
        );
        outputs
    }

    /// Renders the whole definition. Two assemblies from the same
    /// configuration render identically.
    #[must_use]
    pub fn to_manifest(&self) -> serde_json::Value {
        let store = &self.setup.store;
        serde_json::json!({
            "pipeline": self.graph.to_manifest(),
            "repository": self.setup.repository,
            "branch": self.branch,
            "artifact_store": {
                "bucket": store.bucket_name(),
                "versioned": store.is_versioned(),
                "removal_policy": store.removal_policy(),
                "encryption_key": store.encryption_key().arn,
            },
            "key": self.setup.key.as_ref(),
            "roles": {
                "dev": self.dev_roles.to_manifest(),
                "prod": self.prod_roles.to_manifest(),
            },
            "build": {
                "image": self.build_spec.build_image,
                "encryption_key": self.build_spec.encryption_key,
                "buildspec": self.build_spec.render(),
            },
            "outputs": self.outputs(),
        })
    }
}
