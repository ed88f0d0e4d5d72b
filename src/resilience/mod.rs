//! # Resilience
//!
//! Fault tolerance for the external provisioning boundary. The session pool
//! wraps every creation call in a [`CircuitBreaker`]; an open breaker is what
//! "degraded pool key" means operationally.

pub mod circuit_breaker;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
