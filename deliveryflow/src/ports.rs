//! Collaborator traits for the services a run drives.
//!
//! Source control, the deployment engine and the workflow engine are
//! external. Each reports its outcome as an [`ActionOutput`]; a failure is
//! a value with a reason string, never an error or a panic.

use crate::build::{BuildToolchain, TemplateScanner};
use crate::core::ActionOutput;
use crate::iam::Arn;
use crate::pipeline::ApprovalGate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A request for the source revision of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRequest {
    /// Repository name.
    pub repository: String,
    /// Tracked branch.
    pub branch: String,
    /// Commit that triggered the run.
    pub commit: String,
}

/// Fetches source revisions.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Fetches the revision; the output's files become the source artifact.
    async fn fetch(&self, request: &SourceRequest) -> ActionOutput;
}

/// A request to create or update a stack from a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    /// Stage the deployment runs in.
    pub stage: String,
    /// Action name.
    pub action: String,
    /// Stack to create or update.
    pub stack_name: String,
    /// Template file within the input artifact.
    pub template_file: String,
    /// Template contents.
    pub template: Vec<u8>,
    /// Target account.
    pub account_id: String,
    /// Target region.
    pub region: String,
    /// Role the deployment engine assumes.
    pub deployment_role_arn: Arn,
    /// Role the pipeline assumes to start the deployment.
    pub action_role_arn: Arn,
    /// Acknowledged capabilities.
    pub capabilities: Vec<String>,
}

/// The resource-provisioning engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Applies a template. Stack outputs are returned as the output's
    /// variables.
    async fn deploy(&self, request: &DeployRequest) -> ActionOutput;
}

/// A request to start a workflow execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeRequest {
    /// Stage the invocation runs in.
    pub stage: String,
    /// Action name.
    pub action: String,
    /// Workflow to run.
    pub state_machine_arn: Arn,
    /// Resolved execution input.
    pub input: serde_json::Value,
}

/// The workflow engine running integration tests.
#[async_trait]
pub trait WorkflowInvoker: Send + Sync {
    /// Runs the workflow to completion and reports its outcome.
    async fn invoke(&self, request: &InvokeRequest) -> ActionOutput;
}

/// Every external service a run needs.
#[derive(Clone)]
pub struct Collaborators {
    /// Source control.
    pub source: Arc<dyn SourceProvider>,
    /// Build toolchain.
    pub toolchain: Arc<dyn BuildToolchain>,
    /// Template scanner.
    pub scanner: Arc<dyn TemplateScanner>,
    /// Deployment engine.
    pub deployer: Arc<dyn Deployer>,
    /// Workflow engine.
    pub invoker: Arc<dyn WorkflowInvoker>,
    /// Approval notifier.
    pub approvals: Arc<dyn ApprovalGate>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
