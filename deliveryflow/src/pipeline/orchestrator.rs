//! Run execution over an assembled pipeline.

use super::approval::{ApprovalDecision, ApprovalRequest};
use super::report::{ActionResult, ArtifactRef, RunReport, StageResult, StopReason, Trigger};
use super::state::{RunEvent, RunStateMachine};
use super::variables::VariableStore;
use super::{ActionKind, ActionSpec, PipelineDefinition, StageSpec};
use crate::build::BuildRunner;
use crate::core::{ActionOutput, Artifact, PipelineEvent, StageStatus};
use crate::errors::DeliveryError;
use crate::events::{EventSink, NoOpEventSink};
use crate::ports::{Collaborators, DeployRequest, InvokeRequest, SourceRequest};
use crate::utils::{generate_run_id, iso_timestamp};
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// State shared by the actions of one run.
struct RunContext {
    run_id: String,
    trigger: Trigger,
    variables: VariableStore,
    artifacts: RwLock<HashMap<String, Arc<Artifact>>>,
}

impl RunContext {
    fn new(trigger: Trigger) -> Self {
        Self {
            run_id: generate_run_id(),
            trigger,
            variables: VariableStore::new(),
            artifacts: RwLock::new(HashMap::new()),
        }
    }

    fn artifact(&self, name: &str) -> Option<Arc<Artifact>> {
        self.artifacts.read().get(name).cloned()
    }
}

/// Executes runs of one pipeline.
///
/// Stages run strictly in order. Within a stage, actions sharing a run
/// order run concurrently and are joined before the next run order starts.
/// The first failed action stops the run; nothing is retried or rolled
/// back, and a new trigger restarts from the first stage. Runs triggered
/// while another is in flight wait for it to finish.
pub struct PipelineOrchestrator {
    definition: Arc<PipelineDefinition>,
    collaborators: Collaborators,
    build: BuildRunner,
    event_sink: Arc<dyn EventSink>,
    run_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("pipeline", &self.definition.name())
            .field("build", &self.build)
            .finish_non_exhaustive()
    }
}

impl PipelineOrchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(definition: Arc<PipelineDefinition>, collaborators: Collaborators) -> Self {
        let build = BuildRunner::new(
            definition.build_spec.clone(),
            collaborators.toolchain.clone(),
            collaborators.scanner.clone(),
        );
        Self {
            definition,
            collaborators,
            build,
            event_sink: Arc::new(NoOpEventSink),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the pipeline definition.
    #[must_use]
    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    /// Runs the pipeline for a push event.
    ///
    /// Action failures do not produce an error: they stop the run and are
    /// recorded on the report.
    ///
    /// # Errors
    ///
    /// Returns an error if the trigger targets another repository or an
    /// untracked branch, or if the run state machine is driven illegally.
    pub async fn run(&self, trigger: Trigger) -> Result<RunReport, DeliveryError> {
        self.definition
            .accepts(&trigger.repository, &trigger.branch)?;
        let _serial = self.run_lock.lock().await;

        let graph = &self.definition.graph;
        let ctx = RunContext::new(trigger);
        let started_at = iso_timestamp();
        let run_start = Instant::now();
        let mut fsm = RunStateMachine::new(graph.stages().len());
        let mut stages = Vec::with_capacity(graph.stages().len());
        let mut stop_reason: Option<StopReason> = None;

        fsm.apply(RunEvent::Start)?;
        info!(
            run_id = %ctx.run_id,
            pipeline = %graph.name(),
            commit = %ctx.trigger.commit,
            "Starting pipeline run"
        );
        self.emit(PipelineEvent::pipeline_started(
            graph.name(),
            &ctx.run_id,
            &ctx.trigger.commit,
        ))
        .await;

        for stage in graph.stages() {
            if stop_reason.is_some() {
                stages.push(StageResult {
                    name: stage.name.clone(),
                    ordinal: stage.ordinal,
                    status: StageStatus::NotReached,
                    actions: Vec::new(),
                    duration_ms: 0.0,
                });
                continue;
            }

            let (result, failure) = self.run_stage(&ctx, stage).await;
            stages.push(result);
            if let Some(failure) = failure {
                fsm.apply(RunEvent::StageFailed)?;
                stop_reason = Some(failure);
            } else {
                fsm.apply(RunEvent::StageSucceeded)?;
            }
            fsm.apply(RunEvent::Advance)?;
        }

        let duration_ms = elapsed_ms(run_start);
        match &stop_reason {
            None => {
                info!(run_id = %ctx.run_id, duration_ms, "Pipeline run completed");
                self.emit(PipelineEvent::pipeline_completed(graph.name(), &ctx.run_id, duration_ms))
                    .await;
            }
            Some(reason) => {
                warn!(
                    run_id = %ctx.run_id,
                    stage = %reason.stage,
                    action = %reason.action,
                    kind = %reason.kind,
                    reason = %reason.reason,
                    "Pipeline run stopped"
                );
                self.emit(PipelineEvent::pipeline_stopped(
                    graph.name(),
                    &ctx.run_id,
                    &reason.stage,
                    &reason.reason,
                ))
                .await;
            }
        }

        Ok(RunReport {
            run_id: ctx.run_id.clone(),
            pipeline: graph.name().to_string(),
            trigger: ctx.trigger.clone(),
            state: fsm.state(),
            stages,
            stop_reason,
            transitions: fsm.history().to_vec(),
            variables: ctx.variables.snapshot(),
            started_at,
            finished_at: iso_timestamp(),
        })
    }

    async fn run_stage(&self, ctx: &RunContext, stage: &StageSpec) -> (StageResult, Option<StopReason>) {
        info!(run_id = %ctx.run_id, stage = %stage.name, "Stage started");
        self.emit(PipelineEvent::stage_started(&ctx.run_id, &stage.name))
            .await;

        let stage_start = Instant::now();
        let mut actions = Vec::with_capacity(stage.actions.len());
        let mut staged: Vec<(usize, Artifact)> = Vec::new();
        let mut failure: Option<StopReason> = None;

        for (run_order, group) in stage.run_order_groups() {
            debug!(
                run_id = %ctx.run_id,
                stage = %stage.name,
                run_order,
                actions = group.len(),
                "Running action group"
            );
            let outcomes = join_all(group.iter().map(|action| self.run_action(ctx, stage, action))).await;

            for (action, (result, drafts)) in group.iter().zip(outcomes) {
                if failure.is_none() && !result.status.is_success() {
                    failure = Some(StopReason {
                        stage: stage.name.clone(),
                        action: action.name.clone(),
                        kind: action.kind.failure_kind(),
                        reason: result.error.clone().unwrap_or_default(),
                    });
                }
                let index = actions.len();
                staged.extend(drafts.into_iter().map(|draft| (index, draft)));
                actions.push(result);
            }
            if failure.is_some() {
                break;
            }
        }

        if failure.is_none() {
            self.commit_artifacts(ctx, &mut actions, staged);
        } else {
            // Outputs of a failed stage never reach the store.
            let mut artifacts = ctx.artifacts.write();
            for (_, draft) in &staged {
                artifacts.remove(&draft.name);
            }
        }

        let duration_ms = elapsed_ms(stage_start);
        let status = match &failure {
            None => {
                info!(run_id = %ctx.run_id, stage = %stage.name, duration_ms, "Stage succeeded");
                self.emit(PipelineEvent::stage_succeeded(&ctx.run_id, &stage.name, duration_ms))
                    .await;
                StageStatus::Succeeded
            }
            Some(reason) => {
                warn!(
                    run_id = %ctx.run_id,
                    stage = %stage.name,
                    action = %reason.action,
                    reason = %reason.reason,
                    "Stage failed"
                );
                self.emit(PipelineEvent::stage_failed(
                    &ctx.run_id,
                    &stage.name,
                    &reason.action,
                    &reason.reason,
                ))
                .await;
                StageStatus::Failed
            }
        };

        let result = StageResult {
            name: stage.name.clone(),
            ordinal: stage.ordinal,
            status,
            actions,
            duration_ms,
        };
        (result, failure)
    }

    fn commit_artifacts(
        &self,
        ctx: &RunContext,
        actions: &mut [ActionResult],
        staged: Vec<(usize, Artifact)>,
    ) {
        for (index, draft) in staged {
            let artifact = self.definition.store().commit(draft);
            if let Some(result) = actions.get_mut(index) {
                result.artifacts.push(ArtifactRef::from(artifact.as_ref()));
            }
            ctx.artifacts.write().insert(artifact.name.clone(), artifact);
        }
    }

    /// Runs one action. Output artifacts are returned as drafts and are
    /// visible to later run orders of the same stage only.
    async fn run_action(
        &self,
        ctx: &RunContext,
        stage: &StageSpec,
        action: &ActionSpec,
    ) -> (ActionResult, Vec<Artifact>) {
        debug!(
            run_id = %ctx.run_id,
            stage = %stage.name,
            action = %action.name,
            category = action.kind.category(),
            "Action started"
        );
        self.emit(PipelineEvent::action_started(
            &ctx.run_id,
            &stage.name,
            &action.name,
            action.run_order,
        ))
        .await;

        let start = Instant::now();
        let output = self.execute(ctx, stage, action).await;

        let mut drafts = Vec::new();
        let error = if output.is_success() {
            let files = output.files.clone().unwrap_or_default();
            for name in &action.output_artifacts {
                let draft = self.definition.store().draft(
                    name,
                    &stage.name,
                    self.definition.name(),
                    files.clone(),
                );
                ctx.artifacts.write().insert(name.clone(), Arc::new(draft.clone()));
                drafts.push(draft);
            }
            if let Some(namespace) = &action.namespace {
                ctx.variables.publish(namespace, &output.variables);
                debug!(
                    run_id = %ctx.run_id,
                    namespace = %namespace,
                    keys = output.variables.len(),
                    "Published variables"
                );
            }
            None
        } else {
            Some(output.reason())
        };

        self.emit(PipelineEvent::action_finished(
            &ctx.run_id,
            &stage.name,
            &action.name,
            output.status,
            error.as_deref(),
        ))
        .await;

        let result = ActionResult {
            name: action.name.clone(),
            category: action.kind.category().to_string(),
            run_order: action.run_order,
            status: output.status,
            error,
            artifacts: Vec::new(),
            variables: if output.is_success() {
                output.variables
            } else {
                BTreeMap::new()
            },
            duration_ms: elapsed_ms(start),
        };
        (result, drafts)
    }

    async fn execute(&self, ctx: &RunContext, stage: &StageSpec, action: &ActionSpec) -> ActionOutput {
        match &action.kind {
            ActionKind::Source { repository, branch } => {
                let request = SourceRequest {
                    repository: repository.clone(),
                    branch: branch.clone(),
                    commit: ctx.trigger.commit.clone(),
                };
                self.collaborators.source.fetch(&request).await
            }
            ActionKind::Build => {
                let Some(source) = action.input_artifacts.first().and_then(|n| ctx.artifact(n)) else {
                    return missing_input(action);
                };
                self.build.run(&source).await
            }
            ActionKind::Deploy(deploy) => {
                let Some(artifact) = ctx.artifact(&deploy.template.artifact) else {
                    return missing_input(action);
                };
                let Some(template) = artifact.file(&deploy.template.file) else {
                    return ActionOutput::fail(format!(
                        "template '{}' not found in artifact '{}'",
                        deploy.template.file, artifact.name
                    ));
                };
                let request = DeployRequest {
                    stage: stage.name.clone(),
                    action: action.name.clone(),
                    stack_name: deploy.stack_name.clone(),
                    template_file: deploy.template.file.clone(),
                    template: template.to_vec(),
                    account_id: deploy.account_id().to_string(),
                    region: deploy.region.clone(),
                    deployment_role_arn: deploy.roles.deployment_role.arn.clone(),
                    action_role_arn: deploy.roles.action_role.arn.clone(),
                    capabilities: deploy.capabilities.clone(),
                };
                self.collaborators.deployer.deploy(&request).await
            }
            ActionKind::Invoke {
                state_machine_arn,
                input,
            } => match ctx.variables.resolve(input) {
                Ok(resolved) => {
                    let request = InvokeRequest {
                        stage: stage.name.clone(),
                        action: action.name.clone(),
                        state_machine_arn: state_machine_arn.clone(),
                        input: resolved,
                    };
                    self.collaborators.invoker.invoke(&request).await
                }
                Err(err) => ActionOutput::fail(format!("cannot resolve workflow input: {err}")),
            },
            ActionKind::Approve { timeout } => self.approve(ctx, stage, action, *timeout).await,
        }
    }

    async fn approve(
        &self,
        ctx: &RunContext,
        stage: &StageSpec,
        action: &ActionSpec,
        timeout: Duration,
    ) -> ActionOutput {
        self.emit(PipelineEvent::approval_requested(
            &ctx.run_id,
            &stage.name,
            &action.name,
            timeout.as_secs(),
        ))
        .await;

        let request = ApprovalRequest::new(&ctx.run_id, &stage.name, &action.name);
        let decision = tokio::time::timeout(
            timeout,
            self.collaborators.approvals.request(request, timeout),
        )
        .await
        .unwrap_or(ApprovalDecision::TimedOut);

        match decision {
            ApprovalDecision::Approved => {
                info!(run_id = %ctx.run_id, stage = %stage.name, "Approval granted");
                ActionOutput::ok()
            }
            ApprovalDecision::Rejected { reason } => ActionOutput::rejected(reason),
            ApprovalDecision::TimedOut => ActionOutput::timed_out(format!(
                "approval not decided within {}s",
                timeout.as_secs()
            )),
        }
    }

    async fn emit(&self, event: PipelineEvent) {
        self.event_sink.emit(&event).await;
    }
}

fn missing_input(action: &ActionSpec) -> ActionOutput {
    ActionOutput::fail(format!(
        "input artifact '{}' is not available",
        action.input_artifacts.join(", ")
    ))
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
