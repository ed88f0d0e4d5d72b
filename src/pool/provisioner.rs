//! The session provisioning capability boundary.
//!
//! Creating, probing, and closing remote browser sessions are network calls
//! against an external provider with their own latency and failure behavior.
//! The pool owns retry, backoff, and circuit breaking around them; a
//! provisioner implementation only talks to the provider.

use crate::models::session::SessionConfig;
use async_trait::async_trait;

/// Session handle returned by the provisioning service
#[derive(Debug, Clone)]
pub struct ProvisionedSession {
    /// Identifier assigned by the provider
    pub provider_session_id: String,
    /// Endpoint a browser driver connects to
    pub connect_url: Option<String>,
}

/// Failures surfaced by a provisioner implementation
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProvisionerError {
    #[error("provisioning request failed: {0}")]
    Request(String),
    #[error("provider session '{0}' not found")]
    NotFound(String),
}

/// Capability interface to the remote session provider
#[async_trait]
pub trait SessionProvisioner: Send + Sync {
    /// Create a remote session
    async fn create(&self, config: &SessionConfig) -> Result<ProvisionedSession, ProvisionerError>;

    /// Probe a remote session; `Ok(false)` means the session is alive at the
    /// provider but not usable
    async fn health_check(&self, provider_session_id: &str) -> Result<bool, ProvisionerError>;

    /// Close a remote session; closing an already-gone session is not an error
    async fn close(&self, provider_session_id: &str) -> Result<(), ProvisionerError>;
}
