//! # Circuit Breaker
//!
//! Fault isolation for the session provisioning capability. Repeated creation
//! failures against the remote provider trip the breaker open, which the pool
//! surfaces as a degraded pool key: acquires fail fast instead of hammering a
//! provider that is already refusing work. After the reset timeout the
//! breaker lets a limited number of probe calls through (half-open) and
//! closes again once enough of them succeed, giving the pool TTL-based
//! self-healing without operator intervention.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation, calls are allowed through
    Closed = 0,
    /// Failing fast, calls are rejected without executing
    Open = 1,
    /// Testing recovery, limited calls allowed through
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }
}

/// Thresholds and timing for one breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before probing again
    pub reset_timeout: Duration,
    /// Successful probes required to close from half-open
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

/// Circuit breaker with atomic state management
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging
    name: String,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    half_open_successes: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU32::new(0),
            half_open_successes: AtomicU32::new(0),
            opened_at: Mutex::new(None),
            config,
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Check whether a call may proceed, transitioning Open → HalfOpen once
    /// the reset timeout has elapsed.
    pub fn allow(&self) -> bool {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .lock()
                    .map_or(Duration::ZERO, |at| at.elapsed());
                if elapsed >= self.config.reset_timeout {
                    self.half_open_successes.store(0, Ordering::Release);
                    self.state
                        .store(CircuitState::HalfOpen as u8, Ordering::Release);
                    info!(component = %self.name, "🛡️ BREAKER: Half-open, probing recovery");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        match self.state() {
            CircuitState::Closed => {
                self.consecutive_failures.store(0, Ordering::Release);
            }
            CircuitState::HalfOpen => {
                let successes = self.half_open_successes.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.success_threshold {
                    self.consecutive_failures.store(0, Ordering::Release);
                    self.state
                        .store(CircuitState::Closed as u8, Ordering::Release);
                    *self.opened_at.lock() = None;
                    info!(component = %self.name, "✅ BREAKER: Closed, provider recovered");
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        match self.state() {
            CircuitState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                debug!(component = %self.name, failures, "BREAKER: Failure recorded");
                if failures >= self.config.failure_threshold {
                    self.trip_open();
                }
            }
            CircuitState::HalfOpen => self.trip_open(),
            CircuitState::Open => {}
        }
    }

    fn trip_open(&self) {
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        *self.opened_at.lock() = Some(Instant::now());
        warn!(
            component = %self.name,
            reset_timeout_secs = self.config.reset_timeout.as_secs(),
            "⚠️ BREAKER: Open, failing fast"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(reset_timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "provisioner",
            CircuitBreakerConfig {
                failure_threshold: 3,
                reset_timeout,
                success_threshold: 2,
            },
        )
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let cb = breaker(Duration::from_secs(60));
        assert!(cb.allow());
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow());
    }

    #[test]
    fn success_resets_failure_streak() {
        let cb = breaker(Duration::from_secs(60));
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_probe_closes_after_enough_successes() {
        let cb = breaker(Duration::ZERO);
        for _ in 0..3 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);

        // Reset timeout of zero: the next allow() probes immediately
        assert!(cb.allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = breaker(Duration::ZERO);
        for _ in 0..3 {
            cb.record_failure();
        }
        assert!(cb.allow());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
