//! The run state machine.
//!
//! `Pending -> Running(i) -> Succeeded(i) -> Running(i+1) ... -> Completed`,
//! or `Running(i) -> Failed(i) -> Stopped(i)`. Every transition is explicit;
//! anything else is rejected.

use crate::core::RunState;
use crate::errors::DeliveryError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An input to the run state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEvent {
    /// The trigger was accepted.
    Start,
    /// Every action of the running stage succeeded.
    StageSucceeded,
    /// An action of the running stage failed.
    StageFailed,
    /// Move past a finished stage.
    Advance,
}

impl fmt::Display for RunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::StageSucceeded => write!(f, "stage_succeeded"),
            Self::StageFailed => write!(f, "stage_failed"),
            Self::Advance => write!(f, "advance"),
        }
    }
}

/// Tracks one run's position in the stage sequence.
#[derive(Debug, Clone)]
pub struct RunStateMachine {
    state: RunState,
    stage_count: usize,
    history: Vec<RunState>,
}

impl RunStateMachine {
    /// Creates a machine for a pipeline with `stage_count` stages.
    #[must_use]
    pub fn new(stage_count: usize) -> Self {
        Self {
            state: RunState::Pending,
            stage_count,
            history: vec![RunState::Pending],
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Returns every state visited, in order.
    #[must_use]
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    /// Applies an event.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::InvalidTransition`] if the event is not
    /// legal in the current state.
    pub fn apply(&mut self, event: RunEvent) -> Result<RunState, DeliveryError> {
        let next = match (self.state, event) {
            (RunState::Pending, RunEvent::Start) => self.enter(0),
            (RunState::Running { stage }, RunEvent::StageSucceeded) => RunState::Succeeded { stage },
            (RunState::Running { stage }, RunEvent::StageFailed) => RunState::Failed { stage },
            (RunState::Succeeded { stage }, RunEvent::Advance) => self.enter(stage + 1),
            (RunState::Failed { stage }, RunEvent::Advance) => RunState::Stopped { stage },
            (from, event) => {
                return Err(DeliveryError::InvalidTransition {
                    from: from.to_string(),
                    event: event.to_string(),
                })
            }
        };
        self.state = next;
        self.history.push(next);
        Ok(next)
    }

    fn enter(&self, stage: usize) -> RunState {
        if stage < self.stage_count {
            RunState::Running { stage }
        } else {
            RunState::Completed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_happy_path() {
        let mut fsm = RunStateMachine::new(2);
        fsm.apply(RunEvent::Start).unwrap();
        fsm.apply(RunEvent::StageSucceeded).unwrap();
        fsm.apply(RunEvent::Advance).unwrap();
        fsm.apply(RunEvent::StageSucceeded).unwrap();
        let last = fsm.apply(RunEvent::Advance).unwrap();

        assert_eq!(last, RunState::Completed);
        assert_eq!(
            fsm.history(),
            &[
                RunState::Pending,
                RunState::Running { stage: 0 },
                RunState::Succeeded { stage: 0 },
                RunState::Running { stage: 1 },
                RunState::Succeeded { stage: 1 },
                RunState::Completed,
            ]
        );
    }

    #[test]
    fn test_failure_stops() {
        let mut fsm = RunStateMachine::new(3);
        fsm.apply(RunEvent::Start).unwrap();
        fsm.apply(RunEvent::StageSucceeded).unwrap();
        fsm.apply(RunEvent::Advance).unwrap();
        fsm.apply(RunEvent::StageFailed).unwrap();
        assert_eq!(fsm.apply(RunEvent::Advance).unwrap(), RunState::Stopped { stage: 1 });
        assert!(fsm.state().is_terminal());
    }

    #[test]
    fn test_illegal_transitions() {
        let mut fsm = RunStateMachine::new(1);
        assert!(matches!(
            fsm.apply(RunEvent::StageSucceeded),
            Err(DeliveryError::InvalidTransition { .. })
        ));

        fsm.apply(RunEvent::Start).unwrap();
        assert!(fsm.apply(RunEvent::Advance).is_err());
        assert!(fsm.apply(RunEvent::Start).is_err());

        fsm.apply(RunEvent::StageFailed).unwrap();
        fsm.apply(RunEvent::Advance).unwrap();
        assert!(fsm.apply(RunEvent::Start).is_err());
        assert_eq!(fsm.state(), RunState::Stopped { stage: 0 });
    }
}
