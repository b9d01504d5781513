//! Status transition rules for a single execution.

use thiserror::Error;

use super::types::ExecutionStatus;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },
    #[error("Cannot transition from terminal state {state:?}")]
    FromTerminalState { state: ExecutionStatus },
}

pub struct StatusTransition;

impl StatusTransition {
    pub fn validate(from: ExecutionStatus, to: ExecutionStatus) -> Result<(), TransitionError> {
        if from.is_terminal() {
            return Err(TransitionError::FromTerminalState { state: from });
        }

        let is_valid = match (from, to) {
            (ExecutionStatus::Starting, ExecutionStatus::Running) => true,
            // Rejections happen before spawn, so only from Starting.
            (
                ExecutionStatus::Starting,
                ExecutionStatus::RejectedInvalid | ExecutionStatus::CapabilityUnavailable,
            ) => true,
            (
                ExecutionStatus::Starting | ExecutionStatus::Running,
                ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::TimedOut,
            ) => true,
            _ => false,
        };

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from, to })
        }
    }

    pub fn description(status: ExecutionStatus) -> &'static str {
        match status {
            ExecutionStatus::Starting => "starting",
            ExecutionStatus::Running => "process running",
            ExecutionStatus::Completed => "execution finished",
            ExecutionStatus::Failed => "execution failed",
            ExecutionStatus::TimedOut => "execution cancelled by timeout",
            ExecutionStatus::RejectedInvalid => "target rejected",
            ExecutionStatus::CapabilityUnavailable => "required compatibility layer unavailable",
        }
    }
}
