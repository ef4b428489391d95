//! Assertions over run reports.

use crate::core::{ActionStatus, StageStatus};
use crate::errors::FailureKind;
use crate::pipeline::RunReport;

/// Asserts the run completed.
///
/// # Panics
///
/// Panics if the run did not complete.
pub fn assert_run_completed(report: &RunReport) {
    assert!(
        report.is_success(),
        "Expected completed run, got {:?} (stop reason: {:?})",
        report.state,
        report.stop_reason
    );
}

/// Asserts the run stopped at `stage` with the given failure kind.
///
/// # Panics
///
/// Panics if the run did not stop there.
pub fn assert_stopped_at(report: &RunReport, stage: &str, kind: FailureKind) {
    let Some(reason) = &report.stop_reason else {
        panic!("Expected run to stop at {stage}, but it ended as {:?}", report.state);
    };
    assert_eq!(reason.stage, stage, "Run stopped at the wrong stage");
    assert_eq!(reason.kind, kind, "Run stopped for the wrong reason");
}

/// Asserts an action ran with `status`.
///
/// # Panics
///
/// Panics if the action did not run or ended otherwise.
pub fn assert_action_status(report: &RunReport, action: &str, status: ActionStatus) {
    let Some(result) = report.action(action) else {
        panic!("Expected action {action} to have run");
    };
    assert_eq!(result.status, status, "Action {action} has wrong status");
}

/// Asserts every stage after `stage` was never reached.
///
/// # Panics
///
/// Panics if a later stage ran.
pub fn assert_not_reached_after(report: &RunReport, stage: &str) {
    let Some(position) = report.stages.iter().position(|s| s.name == stage) else {
        panic!("Unknown stage {stage}");
    };
    for later in &report.stages[position + 1..] {
        assert_eq!(
            later.status,
            StageStatus::NotReached,
            "Stage {} ran after {stage}",
            later.name
        );
        assert!(later.actions.is_empty());
    }
}
