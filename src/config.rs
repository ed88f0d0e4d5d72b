//! # Configuration
//!
//! Component configuration with environment-variable overrides. Defaults come
//! from [`crate::constants::system`]; every knob can be tuned per deployment
//! with a `DIRECTOR_*` variable.

use crate::constants::system;
use crate::error::{DirectorError, Result};
use std::time::Duration;

/// Top-level configuration for the director core
#[derive(Debug, Clone, Default)]
pub struct DirectorConfig {
    pub pool: PoolConfig,
    pub scheduler: SchedulerConfig,
    pub checkpoint: CheckpointConfig,
}

/// Session pool sizing, health, and provisioning behavior
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Sessions kept warm per pool key at initialization
    pub min_warm: usize,
    /// Hard cap of sessions per pool key; acquire blocks rather than
    /// over-provisioning beyond this
    pub max_size: usize,
    /// Session time-to-live; older sessions are expired by the sweep
    pub session_ttl: Duration,
    /// Idle sessions above the warm floor are closed after this long
    pub max_idle: Duration,
    /// Error count at which a session is marked unhealthy
    pub error_threshold: u32,
    /// Interval between health sweep passes
    pub health_sweep_interval: Duration,
    /// Default wait budget for acquire when the caller does not supply one
    pub acquire_timeout: Duration,
    /// Retries per session-creation call (beyond the first attempt)
    pub create_retries: u32,
    /// Base delay for creation retry backoff
    pub create_backoff_base: Duration,
    /// Ceiling for creation retry backoff
    pub create_backoff_max: Duration,
    /// Consecutive creation failures before a pool key is degraded
    pub degraded_threshold: u32,
    /// How long a degraded pool key waits before probing the provisioner again
    pub degraded_reset_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_warm: system::DEFAULT_MIN_WARM_SESSIONS,
            max_size: system::DEFAULT_MAX_POOL_SIZE,
            session_ttl: Duration::from_secs(system::DEFAULT_SESSION_TTL_SECS),
            max_idle: Duration::from_secs(system::DEFAULT_MAX_IDLE_SECS),
            error_threshold: system::DEFAULT_SESSION_ERROR_THRESHOLD,
            health_sweep_interval: Duration::from_secs(
                system::DEFAULT_HEALTH_SWEEP_INTERVAL_SECS,
            ),
            acquire_timeout: Duration::from_secs(system::DEFAULT_ACQUIRE_TIMEOUT_SECS),
            create_retries: 3,
            create_backoff_base: Duration::from_secs(1),
            create_backoff_max: Duration::from_secs(30),
            degraded_threshold: 5,
            degraded_reset_timeout: Duration::from_secs(60),
        }
    }
}

/// Scheduler loop pacing, retry backoff, and cancellation behavior
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between scheduling ticks when no step outcome arrives
    pub tick_interval: Duration,
    /// Base delay for step retry backoff
    pub retry_backoff_base: Duration,
    /// Ceiling for step retry backoff
    pub retry_backoff_max: Duration,
    /// Default per-step action timeout
    pub default_step_timeout: Duration,
    /// Grace period an in-flight step gets to observe cancellation
    pub cancel_grace_period: Duration,
    /// Completed executions retained in history
    pub history_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            retry_backoff_base: Duration::from_secs(1),
            retry_backoff_max: Duration::from_secs(60),
            default_step_timeout: Duration::from_secs(system::DEFAULT_STEP_TIMEOUT_SECS),
            cancel_grace_period: Duration::from_secs(5),
            history_limit: system::DEFAULT_EXECUTION_HISTORY_LIMIT,
        }
    }
}

/// Checkpoint retention for the in-memory store
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    /// Checkpoints retained per execution by the in-memory store
    pub retain: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            retain: system::DEFAULT_CHECKPOINT_RETENTION,
        }
    }
}

impl DirectorConfig {
    /// Build a configuration from defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(max_size) = std::env::var("DIRECTOR_POOL_MAX_SIZE") {
            config.pool.max_size = max_size.parse().map_err(|e| {
                DirectorError::ConfigurationError(format!("Invalid pool max_size: {e}"))
            })?;
        }

        if let Ok(min_warm) = std::env::var("DIRECTOR_POOL_MIN_WARM") {
            config.pool.min_warm = min_warm.parse().map_err(|e| {
                DirectorError::ConfigurationError(format!("Invalid pool min_warm: {e}"))
            })?;
        }

        if let Ok(ttl) = std::env::var("DIRECTOR_SESSION_TTL_SECS") {
            config.pool.session_ttl = Duration::from_secs(ttl.parse().map_err(|e| {
                DirectorError::ConfigurationError(format!("Invalid session TTL: {e}"))
            })?);
        }

        if let Ok(threshold) = std::env::var("DIRECTOR_SESSION_ERROR_THRESHOLD") {
            config.pool.error_threshold = threshold.parse().map_err(|e| {
                DirectorError::ConfigurationError(format!("Invalid error threshold: {e}"))
            })?;
        }

        if let Ok(interval) = std::env::var("DIRECTOR_HEALTH_SWEEP_INTERVAL_SECS") {
            config.pool.health_sweep_interval =
                Duration::from_secs(interval.parse().map_err(|e| {
                    DirectorError::ConfigurationError(format!("Invalid sweep interval: {e}"))
                })?);
        }

        if let Ok(timeout) = std::env::var("DIRECTOR_STEP_TIMEOUT_SECS") {
            config.scheduler.default_step_timeout =
                Duration::from_secs(timeout.parse().map_err(|e| {
                    DirectorError::ConfigurationError(format!("Invalid step timeout: {e}"))
                })?);
        }

        if let Ok(grace) = std::env::var("DIRECTOR_CANCEL_GRACE_SECS") {
            config.scheduler.cancel_grace_period =
                Duration::from_secs(grace.parse().map_err(|e| {
                    DirectorError::ConfigurationError(format!("Invalid cancel grace: {e}"))
                })?);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = DirectorConfig::default();
        assert!(config.pool.min_warm <= config.pool.max_size);
        assert!(config.pool.create_backoff_base <= config.pool.create_backoff_max);
        assert!(config.scheduler.retry_backoff_base <= config.scheduler.retry_backoff_max);
        assert!(config.checkpoint.retain > 0);
    }
}
