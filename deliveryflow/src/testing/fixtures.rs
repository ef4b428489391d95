//! Fixtures shared by unit and scenario tests.

use std::sync::Arc;

use super::mocks::{
    FixedApproval, RecordingDeployer, ScriptedInvoker, ScriptedScanner, ScriptedToolchain,
    StaticSource,
};
use crate::build::template_file_name;
use crate::config::PipelineConfig;
use crate::core::{digest_files, Artifact, ArtifactFiles, ArtifactLocation};
use crate::iam::AccountRoles;
use crate::pipeline::{PipelineDefinition, PipelineOrchestrator, StageGraphAssembler};
use crate::ports::Collaborators;
use crate::utils::iso_timestamp;

/// A complete two-account configuration.
#[must_use]
pub fn sample_config() -> PipelineConfig {
    PipelineConfig::new()
        .with_accounts("111111111111", "222222222222", "us-east-1")
        .with_artifact_store("pipeline-artifacts", "key-1234")
        .with_source("kinesis-app", "main")
        .with_prod_roles("CodePipelineCrossAccountRole", "CloudFormationCrossAccountRole")
}

/// The definition assembled from [`sample_config`].
///
/// # Panics
///
/// Panics if the sample configuration stops assembling.
#[must_use]
pub fn sample_definition() -> PipelineDefinition {
    StageGraphAssembler::assemble(&sample_config()).expect("sample config assembles")
}

/// Development account roles of the sample pipeline.
#[must_use]
pub fn dev_roles() -> AccountRoles {
    sample_definition().dev_roles
}

/// Production account roles of the sample pipeline.
#[must_use]
pub fn prod_roles() -> AccountRoles {
    sample_definition().prod_roles
}

/// Minimal template body for a synthesized file.
#[must_use]
pub fn template_body(name: &str) -> Vec<u8> {
    serde_json::json!({
        "Description": name,
        "Resources": {},
    })
    .to_string()
    .into_bytes()
}

/// Files of a typical application checkout.
#[must_use]
pub fn source_files() -> ArtifactFiles {
    let mut files = ArtifactFiles::new();
    files.insert("cdk.json".to_string(), br#"{"app":"npx ts-node bin/app.ts"}"#.to_vec());
    files.insert("package.json".to_string(), br#"{"name":"kinesis-app"}"#.to_vec());
    files.insert("bin/app.ts".to_string(), b"new App();".to_vec());
    files
}

/// A stored source artifact wrapping [`source_files`].
#[must_use]
pub fn source_artifact() -> Artifact {
    let files = source_files();
    Artifact {
        name: "SourceArtifact".to_string(),
        producing_stage: "Source".to_string(),
        location: ArtifactLocation {
            bucket: "pipeline-artifacts".to_string(),
            key_prefix: "KinesisApplicationPipeline/SourceArtifact/1".to_string(),
        },
        version: 1,
        digest: digest_files(&files),
        files,
        created_at: iso_timestamp(),
    }
}

/// The scripted collaborators of one run, kept as concrete types so tests
/// can inspect what each received.
#[derive(Debug, Clone)]
pub struct TestHarness {
    /// Source control.
    pub source: Arc<StaticSource>,
    /// Build toolchain.
    pub toolchain: Arc<ScriptedToolchain>,
    /// Template scanner.
    pub scanner: Arc<ScriptedScanner>,
    /// Deployment engine.
    pub deployer: Arc<RecordingDeployer>,
    /// Workflow engine.
    pub invoker: Arc<ScriptedInvoker>,
    /// Approval gate.
    pub approvals: Arc<FixedApproval>,
}

impl Default for TestHarness {
    fn default() -> Self {
        let config = sample_config();
        Self {
            source: Arc::new(StaticSource::new(source_files())),
            toolchain: Arc::new(ScriptedToolchain::synthesizing([
                template_file_name(&config.application_template_stack),
                template_file_name(&config.test_template_stack),
                "manifest.json".to_string(),
            ])),
            scanner: Arc::new(ScriptedScanner::clean()),
            deployer: Arc::new(
                RecordingDeployer::new().with_outputs(
                    config.application_stack_name,
                    [
                        (config.stream_output_name, "kinesis-input-stream"),
                        (config.bucket_output_name, "firehose-output-bucket"),
                    ],
                ),
            ),
            invoker: Arc::new(ScriptedInvoker::succeeding()),
            approvals: Arc::new(FixedApproval::approving()),
        }
    }
}

impl TestHarness {
    /// Creates a harness where every collaborator succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the scanner.
    #[must_use]
    pub fn with_scanner(mut self, scanner: ScriptedScanner) -> Self {
        self.scanner = Arc::new(scanner);
        self
    }

    /// Replaces the deployer.
    #[must_use]
    pub fn with_deployer(mut self, deployer: RecordingDeployer) -> Self {
        self.deployer = Arc::new(deployer);
        self
    }

    /// Replaces the invoker.
    #[must_use]
    pub fn with_invoker(mut self, invoker: ScriptedInvoker) -> Self {
        self.invoker = Arc::new(invoker);
        self
    }

    /// Replaces the approval gate.
    #[must_use]
    pub fn with_approvals(mut self, approvals: FixedApproval) -> Self {
        self.approvals = Arc::new(approvals);
        self
    }

    /// Returns the collaborators as trait objects.
    #[must_use]
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            source: self.source.clone(),
            toolchain: self.toolchain.clone(),
            scanner: self.scanner.clone(),
            deployer: self.deployer.clone(),
            invoker: self.invoker.clone(),
            approvals: self.approvals.clone(),
        }
    }

    /// Builds an orchestrator for `definition` wired to this harness.
    #[must_use]
    pub fn orchestrator(&self, definition: PipelineDefinition) -> PipelineOrchestrator {
        PipelineOrchestrator::new(Arc::new(definition), self.collaborators())
    }
}
