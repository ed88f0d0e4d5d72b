#![allow(clippy::doc_markdown)] // Allow technical terms in docs without backticks
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Director Core
//!
//! Rust core for browser-automation workflow orchestration. Many logical
//! tasks run concurrently against a scarce, expensive, failure-prone
//! resource: remote browser sessions. This crate is the orchestration layer
//! that makes that workable:
//!
//! - **Session pool**: bounded per-pool-key pools of long-lived remote
//!   sessions with background health sweeps, TTL expiry, error-count
//!   thresholds, and replacement with context copied over. Session creation
//!   is retried with backoff behind a circuit breaker; a pool key whose
//!   provider keeps failing degrades and fails fast until it self-heals.
//! - **Workflow engine**: immutable DAG definitions (validated at
//!   construction), one scheduler loop per execution, per-step retries with
//!   capped exponential backoff, step timeouts, priority-ordered admission
//!   under a concurrency bound, pause/resume, cooperative cancellation.
//! - **Checkpoint recovery**: a full execution snapshot after every
//!   step-status transition; after a crash, executions resume from the last
//!   checkpoint without re-running succeeded steps.
//!
//! Page automation itself is pluggable: steps name actions, and action
//! implementations are registered in an [`registry::ActionRegistry`] behind
//! one async `execute` contract.
//!
//! ## Module Organization
//!
//! - [`models`] - Sessions, workflow definitions, execution records
//! - [`pool`] - Session pool manager, provisioner boundary, health sweep
//! - [`orchestration`] - Scheduler, step executor, checkpoints, recovery
//! - [`registry`] - Step action registry
//! - [`state_machine`] - Workflow/step states and transition validation
//! - [`resilience`] - Circuit breaker for the provisioning boundary
//! - [`events`] - Lifecycle event broadcast
//! - [`config`] - Environment-overridable configuration
//! - [`error`] - Crate-level error type
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use director_core::config::DirectorConfig;
//! use director_core::models::session::PoolKey;
//! use director_core::models::workflow::{WorkflowDefinition, WorkflowStep};
//! use director_core::orchestration::Director;
//! use director_core::pool::provisioner::SessionProvisioner;
//! use std::sync::Arc;
//!
//! # async fn example(provisioner: Arc<dyn SessionProvisioner>) -> Result<(), Box<dyn std::error::Error>> {
//! let director = Director::new(DirectorConfig::from_env()?, provisioner);
//! director.initialize(&[PoolKey::from("job_discovery")]).await;
//!
//! let definition = WorkflowDefinition::new(
//!     "job_discovery",
//!     "Search postings and merge results",
//!     vec![
//!         WorkflowStep::new("search", "search_jobs").with_session("job_discovery"),
//!         WorkflowStep::new("merge", "merge_results").with_dependencies(vec!["search"]),
//!     ],
//! )?;
//! let workflow_id = director.create_workflow(definition)?;
//! let execution_id = director.execute(workflow_id).await?;
//! let status = director.status(execution_id).await?;
//! println!("execution {execution_id} is {}", status.status);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod pool;
pub mod registry;
pub mod resilience;
pub mod state_machine;

pub use config::{CheckpointConfig, DirectorConfig, PoolConfig, SchedulerConfig};
pub use error::{DirectorError, Result};
pub use events::{DirectorEvent, EventPublisher};
pub use models::{
    ExecutionCheckpoint, ExecutionId, PoolKey, SessionConfig, SessionId, SessionInfo,
    SessionStatus, WorkflowDefinition, WorkflowExecution, WorkflowId, WorkflowStep,
};
pub use orchestration::{
    CheckpointStore, Director, ExecutionStatusView, FileCheckpointStore, InMemoryCheckpointStore,
    OrchestrationError, OrchestrationResult, SystemMetrics,
};
pub use pool::{
    AcquiredSession, ContextStore, HealthMonitor, PoolError, PoolKeyStats, PoolStats,
    ProvisionedSession, ProvisionerError, SessionOutcome, SessionPool, SessionProvisioner,
    SessionRef,
};
pub use registry::{ActionRegistry, StepAction, StepActionContext, StepActionError};
pub use state_machine::{StepState, WorkflowState};
