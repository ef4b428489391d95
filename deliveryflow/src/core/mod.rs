//! Core domain model types for deliveryflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Action, stage and run status enums
//! - Action output type with factory methods
//! - Artifacts and lifecycle events

mod artifact;
mod event;
mod output;
mod status;

pub use artifact::{digest_files, Artifact, ArtifactFiles, ArtifactLocation};
pub use event::PipelineEvent;
pub use output::ActionOutput;
pub use status::{ActionStatus, RunState, StageStatus};
