//! Pipeline configuration.
//!
//! Every fixed name the stage graph uses (roles, stacks, namespaces, invoke
//! constants) lives here and is passed explicitly to the assembler, so
//! several pipeline instances can coexist.

use crate::errors::{ConfigurationError, DeliveryError};
use crate::iam::arn::{validate_account_id, validate_name, validate_region};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

fn default_branch() -> String {
    "main".to_string()
}

fn default_pipeline_name() -> String {
    "KinesisApplicationPipeline".to_string()
}

fn default_action_role_name() -> String {
    "CodePipelineRole-4PVV5QMKJ60HO".to_string()
}

fn default_deployment_role_name() -> String {
    "CodePipelineCfnDeployRole-0WYTZHE10BS13".to_string()
}

fn default_application_stack_name() -> String {
    "KinesisApplicationStack".to_string()
}

fn default_application_template_stack() -> String {
    "ApplicationStack".to_string()
}

fn default_test_stack_name() -> String {
    "IntTestSfnStack".to_string()
}

fn default_test_template_stack() -> String {
    "IntegTestSfnStack".to_string()
}

fn default_test_state_machine_name() -> String {
    "DevSfnStackStateMachine".to_string()
}

fn default_application_namespace() -> String {
    "Deploy_Application_Ns".to_string()
}

fn default_test_namespace() -> String {
    "Deploy_Integration_Test_Sfn_Ns".to_string()
}

fn default_stream_output() -> String {
    "KinesisInputStreamName".to_string()
}

fn default_bucket_output() -> String {
    "FirehoseOutputBucket".to_string()
}

fn default_wait_seconds() -> String {
    "30".to_string()
}

fn default_record_count() -> u64 {
    1000
}

fn default_approval_timeout_secs() -> u64 {
    7 * 24 * 60 * 60
}

/// Configuration for one cross-account delivery pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name.
    #[serde(default = "default_pipeline_name")]
    pub pipeline_name: String,

    /// Development account (hosts the pipeline, key and artifact store).
    #[serde(default)]
    pub dev_account_id: String,
    /// Production account.
    #[serde(default)]
    pub prod_account_id: String,
    /// Region of the development account and the artifact key.
    #[serde(default)]
    pub region: String,

    /// Artifact key id.
    #[serde(default)]
    pub kms_key_id: String,
    /// Artifact store bucket.
    #[serde(default)]
    pub artifact_bucket_name: String,
    /// Source repository name.
    #[serde(default)]
    pub repository_name: String,
    /// Tracked branch.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Pipeline action role in the development account.
    #[serde(default = "default_action_role_name")]
    pub pipeline_action_role_name: String,
    /// Deployment role in the development account.
    #[serde(default = "default_deployment_role_name")]
    pub deployment_role_name: String,
    /// Cross-account pipeline action role in the production account.
    #[serde(default)]
    pub prod_pipeline_action_role_name: String,
    /// Cross-account deployment role in the production account.
    #[serde(default)]
    pub prod_deployment_role_name: String,

    /// Deployed name of the application stack.
    #[serde(default = "default_application_stack_name")]
    pub application_stack_name: String,
    /// Synthesized name of the application stack (template file stem).
    #[serde(default = "default_application_template_stack")]
    pub application_template_stack: String,
    /// Deployed name of the integration test stack.
    #[serde(default = "default_test_stack_name")]
    pub test_stack_name: String,
    /// Synthesized name of the integration test stack.
    #[serde(default = "default_test_template_stack")]
    pub test_template_stack: String,
    /// State machine the integration test invokes.
    #[serde(default = "default_test_state_machine_name")]
    pub test_state_machine_name: String,

    /// Namespace the application deployment publishes.
    #[serde(default = "default_application_namespace")]
    pub application_namespace: String,
    /// Namespace the test deployment publishes.
    #[serde(default = "default_test_namespace")]
    pub test_namespace: String,
    /// Output carrying the input stream name.
    #[serde(default = "default_stream_output")]
    pub stream_output_name: String,
    /// Output carrying the result bucket name.
    #[serde(default = "default_bucket_output")]
    pub bucket_output_name: String,

    /// Literal `waitSeconds` passed to the test workflow.
    #[serde(default = "default_wait_seconds")]
    pub wait_seconds: String,
    /// Literal `record_count` passed to the test workflow.
    #[serde(default = "default_record_count")]
    pub record_count: u64,

    /// How long a manual approval may stay pending.
    #[serde(default = "default_approval_timeout_secs")]
    pub approval_timeout_secs: u64,

    /// Concrete resource names for permission scoping.
    #[serde(default)]
    pub resources: ScopedResources,
}

/// Optional concrete names of resources the application stack provisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedResources {
    /// Kinesis data streams.
    #[serde(default)]
    pub stream_names: Vec<String>,
    /// Firehose delivery streams.
    #[serde(default)]
    pub delivery_stream_names: Vec<String>,
    /// Lambda functions.
    #[serde(default)]
    pub function_names: Vec<String>,
    /// Log groups.
    #[serde(default)]
    pub log_group_names: Vec<String>,
    /// Output buckets.
    #[serde(default)]
    pub output_bucket_names: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipeline_name: default_pipeline_name(),
            dev_account_id: String::new(),
            prod_account_id: String::new(),
            region: String::new(),
            kms_key_id: String::new(),
            artifact_bucket_name: String::new(),
            repository_name: String::new(),
            branch: default_branch(),
            pipeline_action_role_name: default_action_role_name(),
            deployment_role_name: default_deployment_role_name(),
            prod_pipeline_action_role_name: String::new(),
            prod_deployment_role_name: String::new(),
            application_stack_name: default_application_stack_name(),
            application_template_stack: default_application_template_stack(),
            test_stack_name: default_test_stack_name(),
            test_template_stack: default_test_template_stack(),
            test_state_machine_name: default_test_state_machine_name(),
            application_namespace: default_application_namespace(),
            test_namespace: default_test_namespace(),
            stream_output_name: default_stream_output(),
            bucket_output_name: default_bucket_output(),
            wait_seconds: default_wait_seconds(),
            record_count: default_record_count(),
            approval_timeout_secs: default_approval_timeout_secs(),
            resources: ScopedResources::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults and no account details.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json_str(json: &str) -> Result<Self, DeliveryError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DeliveryError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Builds a configuration from deployment context keys
    /// (`devAccId`, `prodAccId`, `devAccRegion`, `keyId`,
    /// `codePipelineArtifactBucketName`, `codeCommitRepoName`,
    /// `codePipelineCrossAccountRole`, `cloudformationCrossAccountRole`).
    ///
    /// Absent keys are left empty and reported by [`validate`](Self::validate).
    #[must_use]
    pub fn from_context(context: &HashMap<String, String>) -> Self {
        let get = |key: &str| context.get(key).cloned().unwrap_or_default();
        Self {
            dev_account_id: get("devAccId"),
            prod_account_id: get("prodAccId"),
            region: get("devAccRegion"),
            kms_key_id: get("keyId"),
            artifact_bucket_name: get("codePipelineArtifactBucketName"),
            repository_name: get("codeCommitRepoName"),
            prod_pipeline_action_role_name: get("codePipelineCrossAccountRole"),
            prod_deployment_role_name: get("cloudformationCrossAccountRole"),
            ..Self::default()
        }
    }

    /// Sets the accounts and region.
    #[must_use]
    pub fn with_accounts(
        mut self,
        dev_account_id: impl Into<String>,
        prod_account_id: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        self.dev_account_id = dev_account_id.into();
        self.prod_account_id = prod_account_id.into();
        self.region = region.into();
        self
    }

    /// Sets the shared artifact resources.
    #[must_use]
    pub fn with_artifact_store(
        mut self,
        bucket_name: impl Into<String>,
        kms_key_id: impl Into<String>,
    ) -> Self {
        self.artifact_bucket_name = bucket_name.into();
        self.kms_key_id = kms_key_id.into();
        self
    }

    /// Sets the source repository and tracked branch.
    #[must_use]
    pub fn with_source(mut self, repository: impl Into<String>, branch: impl Into<String>) -> Self {
        self.repository_name = repository.into();
        self.branch = branch.into();
        self
    }

    /// Sets the production cross-account role names.
    #[must_use]
    pub fn with_prod_roles(
        mut self,
        action_role_name: impl Into<String>,
        deployment_role_name: impl Into<String>,
    ) -> Self {
        self.prod_pipeline_action_role_name = action_role_name.into();
        self.prod_deployment_role_name = deployment_role_name.into();
        self
    }

    /// Sets the approval timeout. The timeout is kept in whole seconds;
    /// a partial second rounds up.
    #[must_use]
    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout_secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        self
    }

    /// Returns the approval timeout.
    #[must_use]
    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_secs)
    }

    /// Checks every identifier a trust boundary is built from.
    ///
    /// # Errors
    ///
    /// Returns the first missing or malformed field.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        validate_name("pipeline_name", &self.pipeline_name)?;
        validate_account_id("dev_account_id", &self.dev_account_id)?;
        validate_account_id("prod_account_id", &self.prod_account_id)?;
        if self.dev_account_id == self.prod_account_id {
            return Err(ConfigurationError::invalid(
                "prod_account_id",
                &self.prod_account_id,
                "production must be a different account than development",
            ));
        }
        validate_region("region", &self.region)?;

        let names = [
            ("kms_key_id", &self.kms_key_id),
            ("artifact_bucket_name", &self.artifact_bucket_name),
            ("repository_name", &self.repository_name),
            ("branch", &self.branch),
            ("pipeline_action_role_name", &self.pipeline_action_role_name),
            ("deployment_role_name", &self.deployment_role_name),
            ("prod_pipeline_action_role_name", &self.prod_pipeline_action_role_name),
            ("prod_deployment_role_name", &self.prod_deployment_role_name),
            ("application_stack_name", &self.application_stack_name),
            ("application_template_stack", &self.application_template_stack),
            ("test_stack_name", &self.test_stack_name),
            ("test_template_stack", &self.test_template_stack),
            ("test_state_machine_name", &self.test_state_machine_name),
            ("application_namespace", &self.application_namespace),
            ("test_namespace", &self.test_namespace),
            ("stream_output_name", &self.stream_output_name),
            ("bucket_output_name", &self.bucket_output_name),
            ("wait_seconds", &self.wait_seconds),
        ];
        for (field, value) in names {
            validate_name(field, value)?;
        }

        if self.approval_timeout_secs == 0 {
            return Err(ConfigurationError::invalid(
                "approval_timeout_secs",
                "0",
                "approvals need a positive timeout",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn context() -> HashMap<String, String> {
        [
            ("devAccId", "111111111111"),
            ("prodAccId", "222222222222"),
            ("devAccRegion", "us-east-1"),
            ("keyId", "key-1234"),
            ("codePipelineArtifactBucketName", "pipeline-artifacts"),
            ("codeCommitRepoName", "kinesis-app"),
            ("codePipelineCrossAccountRole", "CodePipelineCrossAccountRole"),
            ("cloudformationCrossAccountRole", "CloudFormationCrossAccountRole"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::new();
        assert_eq!(config.branch, "main");
        assert_eq!(config.application_stack_name, "KinesisApplicationStack");
        assert_eq!(config.record_count, 1000);
        assert_eq!(config.wait_seconds, "30");
        assert_eq!(config.approval_timeout(), Duration::from_secs(604_800));
    }

    #[test]
    fn test_from_context() {
        let config = PipelineConfig::from_context(&context());
        assert_eq!(config.prod_account_id, "222222222222");
        assert_eq!(config.prod_deployment_role_name, "CloudFormationCrossAccountRole");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_context_key_is_reported() {
        let mut ctx = context();
        ctx.remove("prodAccId");
        let err = PipelineConfig::from_context(&ctx).validate().unwrap_err();
        assert_eq!(err, ConfigurationError::missing("prod_account_id"));

        let mut ctx = context();
        ctx.remove("keyId");
        let err = PipelineConfig::from_context(&ctx).validate().unwrap_err();
        assert_eq!(err.field(), "kms_key_id");
    }

    #[test]
    fn test_same_account_rejected() {
        let config = PipelineConfig::from_context(&context())
            .with_accounts("111111111111", "111111111111", "us-east-1");
        assert_eq!(config.validate().unwrap_err().field(), "prod_account_id");
    }

    #[test]
    fn test_zero_approval_timeout_rejected() {
        let config = PipelineConfig::from_context(&context()).with_approval_timeout(Duration::ZERO);
        assert_eq!(config.validate().unwrap_err().field(), "approval_timeout_secs");
    }

    #[test]
    fn test_partial_second_timeout_rounds_up() {
        let config = PipelineConfig::from_context(&context())
            .with_approval_timeout(Duration::from_millis(10));
        assert_eq!(config.approval_timeout(), Duration::from_secs(1));
        assert!(config.validate().is_ok());

        let config = PipelineConfig::from_context(&context())
            .with_approval_timeout(Duration::from_millis(2500));
        assert_eq!(config.approval_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_from_json_applies_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{
                "dev_account_id": "111111111111",
                "prod_account_id": "222222222222",
                "region": "eu-west-1",
                "kms_key_id": "abc",
                "artifact_bucket_name": "artifacts",
                "repository_name": "repo",
                "prod_pipeline_action_role_name": "ProdPipeline",
                "prod_deployment_role_name": "ProdDeploy",
                "resources": { "stream_names": ["input"] }
            }"#,
        )
        .unwrap();

        assert_eq!(config.branch, "main");
        assert_eq!(config.test_state_machine_name, "DevSfnStackStateMachine");
        assert_eq!(config.resources.stream_names, vec!["input".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let config = PipelineConfig::from_context(&context());
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&config).unwrap().as_bytes())
            .unwrap();

        let loaded = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            PipelineConfig::from_json_str("{not json"),
            Err(DeliveryError::Serialization(_))
        ));
    }
}
