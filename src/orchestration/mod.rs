//! # Orchestration Engine
//!
//! Dependency-aware scheduling of declarative workflows over pooled sessions.
//!
//! ## Core Components
//!
//! - **[`Director`]**: the engine; lifecycle API, one scheduler loop per
//!   execution, pause/resume/cancel, recovery, and the status surface
//! - **[`StepExecutor`]**: runs one step attempt with balanced session
//!   acquire/release and timeout/cancellation handling
//! - **[`readiness`]**: in-memory DAG analysis (ready set, skip propagation)
//! - **[`checkpoint`]**: the `CheckpointStore` boundary plus in-memory and
//!   JSON-lines file stores
//! - **[`BackoffCalculator`]**: capped exponential retry delays with jitter

pub mod backoff;
pub mod checkpoint;
pub mod coordinator;
pub mod errors;
pub mod readiness;
pub mod step_executor;
pub mod types;

pub use backoff::BackoffCalculator;
pub use checkpoint::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
pub use coordinator::Director;
pub use errors::{CheckpointError, OrchestrationError, OrchestrationResult};
pub use step_executor::{StepAttemptRequest, StepExecutor};
pub use types::{
    ExecutionStatusView, StepAttemptResult, StepOutcome, StepStatusView, SystemMetrics,
};
