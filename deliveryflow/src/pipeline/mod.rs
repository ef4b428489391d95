//! Pipeline building and execution.
//!
//! This module provides:
//! - Stage and action specifications
//! - A validating builder and the release pipeline assembler
//! - The run orchestrator with its state machine and reports
//! - Manual approvals and cross-action variables

mod approval;
mod assembler;
mod builder;
mod definition;
mod orchestrator;
mod report;
mod spec;
mod state;
mod variables;


pub use approval::{ApprovalDecision, ApprovalGate, ApprovalRequest, ApprovalService};
pub use assembler::{
    invoke_input, StageGraphAssembler, BUILD_ARTIFACT, DEPLOY_CAPABILITIES, SOURCE_ARTIFACT,
    STAGE_BUILD, STAGE_DEPLOY_DEV, STAGE_DEPLOY_PROD, STAGE_INTEGRATION_TEST,
    STAGE_MANUAL_APPROVE, STAGE_SOURCE,
};
pub use builder::{check_promotion_gates, PipelineBuilder};
pub use definition::{PipelineDefinition, StageGraph};
pub use orchestrator::PipelineOrchestrator;
pub use report::{ActionResult, ArtifactRef, RunReport, StageResult, StopReason, Trigger};
pub use spec::{ActionKind, ActionSpec, DeployAction, StageSpec, TemplatePath};
pub use state::{RunEvent, RunStateMachine};
pub use variables::{references, variable_reference, VariableStore};
