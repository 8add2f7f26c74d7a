//! Core domain errors.

use thiserror::Error;

use crate::TaskStatus;

/// Core domain errors for MeshRun.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Transition not permitted by the task state machine.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: TaskStatus, to: TaskStatus },

    /// Invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
