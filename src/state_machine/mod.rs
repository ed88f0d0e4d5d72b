//! # State Machines
//!
//! State definitions and transition validation for workflow executions and
//! their steps. Every mutation the scheduler applies to an execution record
//! goes through [`workflow_transition`] or [`step_transition`], so an illegal
//! transition is a programming error surfaced as [`TransitionError`] rather
//! than silent state corruption.
//!
//! The session lifecycle is intentionally not modeled here: session status is
//! owned by the pool's single point of serialization (see `pool`), which is
//! the only writer.

pub mod events;
pub mod states;

pub use events::{StepEvent, WorkflowEvent};
pub use states::{StepState, WorkflowState};

/// Error raised when an event is not legal in the current state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("invalid workflow transition: {event} from {from}")]
    InvalidWorkflowTransition { from: WorkflowState, event: String },
    #[error("invalid step transition: {event} from {from}")]
    InvalidStepTransition { from: StepState, event: String },
}

/// Resolve the workflow state an event leads to, or fail if the event is not
/// legal in the current state.
pub fn workflow_transition(
    from: WorkflowState,
    event: &WorkflowEvent,
) -> Result<WorkflowState, TransitionError> {
    use WorkflowState::*;

    let next = match (from, event) {
        (Pending, WorkflowEvent::Start) => Running,
        (Running, WorkflowEvent::Pause) => Paused,
        (Paused, WorkflowEvent::Resume) => Running,
        (Running, WorkflowEvent::Complete) => Completed,
        (Running, WorkflowEvent::Fail(_)) => Failed,
        (Pending | Running | Paused, WorkflowEvent::Cancel) => Cancelled,
        _ => {
            return Err(TransitionError::InvalidWorkflowTransition {
                from,
                event: event.event_type().to_string(),
            })
        }
    };
    Ok(next)
}

/// Resolve the step state an event leads to, or fail if the event is not
/// legal in the current state.
pub fn step_transition(from: StepState, event: &StepEvent) -> Result<StepState, TransitionError> {
    use StepState::*;

    let next = match (from, event) {
        (Pending, StepEvent::Start) => Running,
        (Running, StepEvent::Succeed(_)) => Succeeded,
        (Running, StepEvent::Fail(_)) => Failed,
        (Running, StepEvent::Requeue) => Pending,
        // Pending steps are skipped on upstream failure or cancellation;
        // Running steps are skipped when abandoned past the grace period.
        (Pending | Running, StepEvent::Skip(_)) => Skipped,
        _ => {
            return Err(TransitionError::InvalidStepTransition {
                from,
                event: event.event_type().to_string(),
            })
        }
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_lifecycle_transitions() {
        let running =
            workflow_transition(WorkflowState::Pending, &WorkflowEvent::Start).unwrap();
        assert_eq!(running, WorkflowState::Running);

        let paused = workflow_transition(running, &WorkflowEvent::Pause).unwrap();
        assert_eq!(paused, WorkflowState::Paused);

        let resumed = workflow_transition(paused, &WorkflowEvent::Resume).unwrap();
        assert_eq!(resumed, WorkflowState::Running);

        assert_eq!(
            workflow_transition(resumed, &WorkflowEvent::Complete).unwrap(),
            WorkflowState::Completed
        );
    }

    #[test]
    fn terminal_workflow_states_reject_events() {
        for terminal in [
            WorkflowState::Completed,
            WorkflowState::Failed,
            WorkflowState::Cancelled,
        ] {
            assert!(workflow_transition(terminal, &WorkflowEvent::Start).is_err());
            assert!(workflow_transition(terminal, &WorkflowEvent::Cancel).is_err());
        }
    }

    #[test]
    fn step_retry_cycle() {
        let running = step_transition(StepState::Pending, &StepEvent::Start).unwrap();
        assert_eq!(running, StepState::Running);

        let pending = step_transition(running, &StepEvent::Requeue).unwrap();
        assert_eq!(pending, StepState::Pending);

        let running = step_transition(pending, &StepEvent::Start).unwrap();
        let failed = step_transition(running, &StepEvent::Fail("boom".into())).unwrap();
        assert_eq!(failed, StepState::Failed);
        assert!(step_transition(failed, &StepEvent::Start).is_err());
    }

    #[test]
    fn succeeded_steps_cannot_be_skipped() {
        assert!(step_transition(StepState::Succeeded, &StepEvent::Skip("x".into())).is_err());
    }
}
