//! Action, stage and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The outcome of a single action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Action has not started.
    #[default]
    Pending,
    /// Action is executing.
    Running,
    /// Action completed successfully.
    Succeeded,
    /// Action failed.
    Failed,
    /// A manual approval was rejected.
    Rejected,
    /// A manual approval expired.
    TimedOut,
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Rejected => write!(f, "rejected"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

impl ActionStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Returns true if the action succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns true if the action stops the run.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Rejected | Self::TimedOut)
    }
}

/// The status of a stage within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// The run has not reached the stage yet.
    #[default]
    Pending,
    /// The stage's actions are executing.
    Running,
    /// Every action succeeded.
    Succeeded,
    /// At least one action failed.
    Failed,
    /// The run stopped before the stage.
    NotReached,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::NotReached => write!(f, "not_reached"),
        }
    }
}

/// The state of a pipeline run.
///
/// Stage positions are zero-based ordinals into the pipeline's stage list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    /// Triggered but no stage has started.
    #[default]
    Pending,
    /// A stage is executing.
    Running {
        /// Stage ordinal.
        stage: usize,
    },
    /// A stage finished with every action successful.
    Succeeded {
        /// Stage ordinal.
        stage: usize,
    },
    /// A stage finished with a failed action.
    Failed {
        /// Stage ordinal.
        stage: usize,
    },
    /// Every stage succeeded.
    Completed,
    /// The run halted at a failed stage.
    Stopped {
        /// Ordinal of the stage that failed.
        stage: usize,
    },
}

impl RunState {
    /// Returns true for `Completed` and `Stopped`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped { .. })
    }

    /// Returns the stage ordinal the state refers to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<usize> {
        match self {
            Self::Running { stage }
            | Self::Succeeded { stage }
            | Self::Failed { stage }
            | Self::Stopped { stage } => Some(*stage),
            Self::Pending | Self::Completed => None,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running { stage } => write!(f, "running({stage})"),
            Self::Succeeded { stage } => write!(f, "succeeded({stage})"),
            Self::Failed { stage } => write!(f, "failed({stage})"),
            Self::Completed => write!(f, "completed"),
            Self::Stopped { stage } => write!(f, "stopped({stage})"),
        }
    }
}
