//! Structured error types for the orchestration engine.

use crate::models::execution::ExecutionId;
use crate::models::workflow::{DefinitionError, WorkflowId};
use crate::pool::session_pool::PoolError;
use crate::state_machine::{TransitionError, WorkflowState};

/// Errors surfaced by the orchestrator's control and status surface
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("workflow {0} not found")]
    WorkflowNotFound(WorkflowId),

    #[error("execution {0} not found")]
    ExecutionNotFound(ExecutionId),

    #[error("execution {execution_id} is {status}, cannot {operation}")]
    InvalidExecutionState {
        execution_id: ExecutionId,
        status: WorkflowState,
        operation: &'static str,
    },

    #[error("execution {0} was cancelled")]
    ExecutionCancelled(ExecutionId),

    #[error("no checkpoint recorded for execution {0}")]
    CheckpointNotFound(ExecutionId),

    #[error("checkpoint store failure: {0}")]
    CheckpointStore(#[from] CheckpointError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Failures inside a checkpoint store implementation
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint io: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type OrchestrationResult<T> = Result<T, OrchestrationError>;
