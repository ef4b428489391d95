//! # Deliveryflow
//!
//! A cross-account continuous delivery pipeline for infrastructure-as-code
//! applications.
//!
//! Deliveryflow models a release pipeline that lives in a development account
//! and promotes to a production account:
//!
//! - **Scoped trust**: deployment and pipeline roles per account, with
//!   permission sets built from concrete resource ARNs
//! - **Build gate**: synthesize templates and reject any that fail the
//!   security scan
//! - **Validated stage graph**: artifacts and variable namespaces must be
//!   produced before they are consumed, and production is only reachable
//!   through an integration test and a manual approval
//! - **Run orchestration**: an explicit state machine that stops at the
//!   first failed action and reports why
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use deliveryflow::prelude::*;
//!
//! let config = PipelineConfig::from_file("pipeline.json")?;
//! let definition = StageGraphAssembler::assemble(&config)?;
//!
//! let orchestrator = PipelineOrchestrator::new(Arc::new(definition), collaborators)
//!     .with_event_sink(Arc::new(LoggingEventSink::info()));
//! let report = orchestrator
//!     .run(Trigger::push("kinesis-app", "main", commit))
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod build;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod iam;
pub mod observability;
pub mod pipeline;
pub mod ports;
pub mod resources;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::build::{BuildSpec, BuildToolchain, ScanReport, TemplateScanner};
    pub use crate::config::PipelineConfig;
    pub use crate::core::{
        ActionOutput, ActionStatus, Artifact, ArtifactFiles, PipelineEvent, RunState,
        StageStatus,
    };
    pub use crate::errors::{
        ConfigurationError, ContractErrorInfo, DeliveryError, FailureKind,
        PipelineValidationError, TriggerError, VariableError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::iam::{AccountRoles, Arn, PolicyDocument, Principal, Role, TrustPolicyBuilder};
    pub use crate::observability::{init_logging, LogFormat};
    pub use crate::pipeline::{
        ActionSpec, ApprovalDecision, ApprovalGate, ApprovalService, PipelineBuilder,
        PipelineDefinition, PipelineOrchestrator, RunReport, StageGraph, StageGraphAssembler,
        StageSpec, Trigger,
    };
    pub use crate::ports::{Collaborators, Deployer, SourceProvider, WorkflowInvoker};
    pub use crate::resources::{ArtifactStore, DevAccountSetup, EncryptionKey};
    pub use crate::utils::{generate_run_id, iso_timestamp, Timestamp};
    pub use std::sync::Arc;
}
