//! Testing utilities for delivery pipelines.
//!
//! This module provides:
//! - Scripted collaborators that record what they were asked to do
//! - A sample configuration and the fixtures derived from it
//! - Assertions over run reports

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_action_status, assert_not_reached_after, assert_run_completed, assert_stopped_at,
};
pub use fixtures::{
    dev_roles, prod_roles, sample_config, sample_definition, source_artifact, source_files,
    template_body, TestHarness,
};
pub use mocks::{
    FixedApproval, RecordingDeployer, ScriptedInvoker, ScriptedScanner, ScriptedToolchain,
    StaticSource,
};
