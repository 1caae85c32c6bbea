// State machine module for task-run lifecycle
//
// A task run moves from Created through Running to exactly one terminal state.
// Subtask runs share the same states.

pub mod events;
pub mod states;

pub use events::TaskRunEvent;
pub use states::TaskRunState;

use crate::error::{CommissionerError, Result};

/// Determine the state an event moves a run into, rejecting anything that
/// would leave a terminal state.
pub fn determine_target_state(current: TaskRunState, event: &TaskRunEvent) -> Result<TaskRunState> {
    let target = match (current, event) {
        (TaskRunState::Created, TaskRunEvent::Start) => TaskRunState::Running,

        (TaskRunState::Running, TaskRunEvent::Succeed) => TaskRunState::Success,

        (TaskRunState::Created, TaskRunEvent::Fail(_)) => TaskRunState::Failure,
        (TaskRunState::Running, TaskRunEvent::Fail(_)) => TaskRunState::Failure,

        (TaskRunState::Created, TaskRunEvent::Abort) => TaskRunState::Aborted,
        (TaskRunState::Running, TaskRunEvent::Abort) => TaskRunState::Aborted,

        (from_state, _) => {
            return Err(CommissionerError::InvalidTransition {
                entity: "task_run".to_string(),
                from: from_state.to_string(),
                to: event.event_type().to_string(),
            })
        }
    };

    Ok(target)
}
