//! # Session Pool Manager
//!
//! Bounded, health-monitored pools of remote browser sessions shared across
//! concurrent workflow steps.
//!
//! ## Components
//!
//! - [`SessionPool`] — per-pool-key session tables, Idle ⇄ Active hand-off,
//!   creation with retry/backoff behind a circuit breaker, replacement of
//!   retired sessions with context copied over
//! - [`SessionProvisioner`] — capability trait to the external provider
//! - [`HealthMonitor`] — fixed-interval background sweep
//! - [`ContextStore`] — session-scoped cross-step state

pub mod context;
pub mod health;
pub mod provisioner;
pub mod session_pool;

pub use context::{ContextEntry, ContextStore};
pub use health::HealthMonitor;
pub use provisioner::{ProvisionedSession, ProvisionerError, SessionProvisioner};
pub use session_pool::{
    AcquiredSession, PoolError, PoolKeyStats, PoolStats, SessionOutcome, SessionPool, SessionRef,
};
