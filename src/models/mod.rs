//! # Data Model
//!
//! Core entities: pooled sessions, declarative workflow definitions, and the
//! mutable execution records the scheduler drives.

pub mod execution;
pub mod session;
pub mod workflow;

pub use execution::{
    ExecutionCheckpoint, ExecutionId, FailureSummary, StepExecution, WorkflowExecution,
};
pub use session::{PoolKey, SessionConfig, SessionId, SessionInfo, SessionStatus, Viewport};
pub use workflow::{
    DefinitionError, ExecutionPriority, StepId, StepResource, WorkflowDefinition, WorkflowId,
    WorkflowPriority, WorkflowStep,
};
