//! # System Constants
//!
//! Lifecycle event names and operational defaults shared across the session
//! pool and the orchestration engine.

// Re-export state types under their status aliases for convenience
pub use crate::models::session::SessionStatus;
pub use crate::state_machine::{StepState as StepStatus, WorkflowState as WorkflowStatus};

/// Lifecycle events published through the [`crate::events::EventPublisher`]
pub mod events {
    // Session lifecycle events
    pub const SESSION_CREATED: &str = "session.created";
    pub const SESSION_REPLACED: &str = "session.replaced";
    pub const SESSION_UNHEALTHY: &str = "session.unhealthy";
    pub const SESSION_EXPIRED: &str = "session.expired";
    pub const SESSION_CLOSED: &str = "session.closed";

    // Pool lifecycle events
    pub const POOL_DEGRADED: &str = "pool.degraded";
    pub const POOL_RECOVERED: &str = "pool.recovered";

    // Workflow lifecycle events
    pub const WORKFLOW_STARTED: &str = "workflow.started";
    pub const WORKFLOW_COMPLETED: &str = "workflow.completed";
    pub const WORKFLOW_FAILED: &str = "workflow.failed";
    pub const WORKFLOW_CANCELLED: &str = "workflow.cancelled";
    pub const WORKFLOW_PAUSED: &str = "workflow.paused";
    pub const WORKFLOW_RESUMED: &str = "workflow.resumed";
    pub const WORKFLOW_RECOVERED: &str = "workflow.recovered";

    // Step lifecycle events
    pub const STEP_STARTED: &str = "step.started";
    pub const STEP_COMPLETED: &str = "step.completed";
    pub const STEP_FAILED: &str = "step.failed";
    pub const STEP_RETRYING: &str = "step.retrying";
    pub const STEP_SKIPPED: &str = "step.skipped";

    // Checkpoint events
    pub const CHECKPOINT_CREATED: &str = "checkpoint.created";
}

/// Operational defaults, overridable through [`crate::config`]
pub mod system {
    /// Consecutive errors before a session is marked unhealthy
    pub const DEFAULT_SESSION_ERROR_THRESHOLD: u32 = 3;
    /// Sessions kept warm per pool key at initialization
    pub const DEFAULT_MIN_WARM_SESSIONS: usize = 1;
    /// Hard cap of sessions per pool key
    pub const DEFAULT_MAX_POOL_SIZE: usize = 5;
    /// Session time-to-live in seconds (30 minutes)
    pub const DEFAULT_SESSION_TTL_SECS: u64 = 1800;
    /// Idle sessions above the warm floor are reclaimed after this long
    pub const DEFAULT_MAX_IDLE_SECS: u64 = 1800;
    /// Interval between health sweep passes
    pub const DEFAULT_HEALTH_SWEEP_INTERVAL_SECS: u64 = 60;
    /// Default wait budget for `acquire`
    pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

    /// Concurrently running steps per execution
    pub const DEFAULT_MAX_CONCURRENT_STEPS: usize = 3;
    /// Default per-step action timeout (5 minutes)
    pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 300;
    /// Default whole-workflow timeout (30 minutes)
    pub const DEFAULT_WORKFLOW_TIMEOUT_SECS: u64 = 1800;
    /// Default retry budget per step
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    /// Completed executions retained in history
    pub const DEFAULT_EXECUTION_HISTORY_LIMIT: usize = 100;
    /// Checkpoints retained per execution by the in-memory store
    pub const DEFAULT_CHECKPOINT_RETENTION: usize = 10;
}
