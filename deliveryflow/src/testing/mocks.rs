//! Scripted collaborators for driving runs without external services.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::build::{BuildSpec, BuildToolchain, ScanReport, TemplateScanner};
use crate::core::{ActionOutput, Artifact, ArtifactFiles};
use crate::pipeline::{ApprovalDecision, ApprovalGate, ApprovalRequest};
use crate::ports::{
    DeployRequest, Deployer, InvokeRequest, SourceProvider, SourceRequest, WorkflowInvoker,
};

/// Source control returning a fixed checkout.
#[derive(Debug)]
pub struct StaticSource {
    output: ActionOutput,
    requests: Mutex<Vec<SourceRequest>>,
}

impl StaticSource {
    /// Returns `files` for every fetch.
    #[must_use]
    pub fn new(files: ArtifactFiles) -> Self {
        Self {
            output: ActionOutput::ok_with_files(files),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fails every fetch.
    #[must_use]
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            output: ActionOutput::fail(reason),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns the recorded requests.
    #[must_use]
    pub fn requests(&self) -> Vec<SourceRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl SourceProvider for StaticSource {
    async fn fetch(&self, request: &SourceRequest) -> ActionOutput {
        self.requests.lock().push(request.clone());
        self.output.clone()
    }
}

/// Toolchain that "synthesizes" a fixed set of files.
#[derive(Debug)]
pub struct ScriptedToolchain {
    files: ArtifactFiles,
    install_failure: Option<String>,
    installs: Mutex<usize>,
    syntheses: Mutex<usize>,
}

impl ScriptedToolchain {
    /// Synthesizes the given file names with template content.
    #[must_use]
    pub fn synthesizing<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let files = names
            .into_iter()
            .map(|name| {
                let name = name.into();
                let body = super::fixtures::template_body(&name);
                (name, body)
            })
            .collect();
        Self::with_files(files)
    }

    /// Synthesizes exactly `files`.
    #[must_use]
    pub fn with_files(files: ArtifactFiles) -> Self {
        Self {
            files,
            install_failure: None,
            installs: Mutex::new(0),
            syntheses: Mutex::new(0),
        }
    }

    /// Fails the install phase.
    #[must_use]
    pub fn failing_install(mut self, reason: impl Into<String>) -> Self {
        self.install_failure = Some(reason.into());
        self
    }

    /// Returns how many times synthesis ran.
    #[must_use]
    pub fn synthesis_count(&self) -> usize {
        *self.syntheses.lock()
    }
}

#[async_trait]
impl BuildToolchain for ScriptedToolchain {
    async fn install(&self, _spec: &BuildSpec, _source: &Artifact) -> ActionOutput {
        *self.installs.lock() += 1;
        match &self.install_failure {
            Some(reason) => ActionOutput::fail(reason.clone()),
            None => ActionOutput::ok(),
        }
    }

    async fn synthesize(&self, _spec: &BuildSpec, _source: &Artifact) -> ActionOutput {
        *self.syntheses.lock() += 1;
        ActionOutput::ok_with_files(self.files.clone())
    }
}

/// Scanner with scripted findings per template.
#[derive(Debug, Default)]
pub struct ScriptedScanner {
    findings: HashMap<String, Vec<String>>,
    scanned: Mutex<Vec<String>>,
}

impl ScriptedScanner {
    /// Passes every template.
    #[must_use]
    pub fn clean() -> Self {
        Self::default()
    }

    /// Fails `template` with one finding.
    #[must_use]
    pub fn failing(template: impl Into<String>, finding: impl Into<String>) -> Self {
        Self::default().with_finding(template, finding)
    }

    /// Adds a finding for `template`.
    #[must_use]
    pub fn with_finding(mut self, template: impl Into<String>, finding: impl Into<String>) -> Self {
        self.findings
            .entry(template.into())
            .or_default()
            .push(finding.into());
        self
    }

    /// Returns the scanned template names, in scan order.
    #[must_use]
    pub fn scanned(&self) -> Vec<String> {
        self.scanned.lock().clone()
    }
}

#[async_trait]
impl TemplateScanner for ScriptedScanner {
    async fn scan(&self, template: &str, _contents: &[u8]) -> ScanReport {
        self.scanned.lock().push(template.to_string());
        match self.findings.get(template) {
            Some(findings) => ScanReport::failed(template, findings.clone()),
            None => ScanReport::clean(template),
        }
    }
}

/// Deployment engine that records requests and returns scripted outputs
/// per stack.
#[derive(Debug, Default)]
pub struct RecordingDeployer {
    outputs: HashMap<String, ActionOutput>,
    delays: HashMap<String, Duration>,
    requests: Mutex<Vec<DeployRequest>>,
    timeline: Mutex<Vec<String>>,
}

impl RecordingDeployer {
    /// Succeeds every deployment with no outputs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `outputs` when `stack` is deployed.
    #[must_use]
    pub fn with_outputs<I, K, V>(mut self, stack: impl Into<String>, outputs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let variables: BTreeMap<String, String> = outputs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.outputs
            .insert(stack.into(), ActionOutput::ok_with_variables(variables));
        self
    }

    /// Fails deployments of `stack`.
    #[must_use]
    pub fn failing(mut self, stack: impl Into<String>, reason: impl Into<String>) -> Self {
        self.outputs.insert(stack.into(), ActionOutput::fail(reason));
        self
    }

    /// Holds deployments of `stack` for `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, stack: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(stack.into(), delay);
        self
    }

    /// Returns `started <stack>` and `finished <stack>` entries in the
    /// order they happened.
    #[must_use]
    pub fn timeline(&self) -> Vec<String> {
        self.timeline.lock().clone()
    }

    /// Returns every recorded request.
    #[must_use]
    pub fn requests(&self) -> Vec<DeployRequest> {
        self.requests.lock().clone()
    }

    /// Returns `(account, stack)` of each deployment, in order.
    #[must_use]
    pub fn deployments(&self) -> Vec<(String, String)> {
        self.requests
            .lock()
            .iter()
            .map(|r| (r.account_id.clone(), r.stack_name.clone()))
            .collect()
    }
}

#[async_trait]
impl Deployer for RecordingDeployer {
    async fn deploy(&self, request: &DeployRequest) -> ActionOutput {
        self.requests.lock().push(request.clone());
        self.timeline
            .lock()
            .push(format!("started {}", request.stack_name));
        if let Some(delay) = self.delays.get(&request.stack_name) {
            tokio::time::sleep(*delay).await;
        }
        self.timeline
            .lock()
            .push(format!("finished {}", request.stack_name));
        self.outputs
            .get(&request.stack_name)
            .cloned()
            .unwrap_or_else(ActionOutput::ok)
    }
}

/// Workflow engine returning a scripted outcome.
#[derive(Debug)]
pub struct ScriptedInvoker {
    output: ActionOutput,
    requests: Mutex<Vec<InvokeRequest>>,
}

impl ScriptedInvoker {
    /// Every execution succeeds.
    #[must_use]
    pub fn succeeding() -> Self {
        Self {
            output: ActionOutput::ok(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every execution fails.
    #[must_use]
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            output: ActionOutput::fail(reason),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns the recorded requests.
    #[must_use]
    pub fn requests(&self) -> Vec<InvokeRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl WorkflowInvoker for ScriptedInvoker {
    async fn invoke(&self, request: &InvokeRequest) -> ActionOutput {
        self.requests.lock().push(request.clone());
        self.output.clone()
    }
}

/// Approval gate with a fixed decision.
#[derive(Debug)]
pub struct FixedApproval {
    decision: Option<ApprovalDecision>,
    requests: Mutex<Vec<ApprovalRequest>>,
}

impl FixedApproval {
    /// Approves every request.
    #[must_use]
    pub fn approving() -> Self {
        Self::deciding(Some(ApprovalDecision::Approved))
    }

    /// Rejects every request.
    #[must_use]
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self::deciding(Some(ApprovalDecision::Rejected {
            reason: reason.into(),
        }))
    }

    /// Never decides; requests only end when the caller times out.
    #[must_use]
    pub fn silent() -> Self {
        Self::deciding(None)
    }

    fn deciding(decision: Option<ApprovalDecision>) -> Self {
        Self {
            decision,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns the recorded requests.
    #[must_use]
    pub fn requests(&self) -> Vec<ApprovalRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ApprovalGate for FixedApproval {
    async fn request(&self, request: ApprovalRequest, _timeout: Duration) -> ApprovalDecision {
        self.requests.lock().push(request);
        match &self.decision {
            Some(decision) => decision.clone(),
            None => std::future::pending::<ApprovalDecision>().await,
        }
    }
}
