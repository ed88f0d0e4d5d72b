//! Session identity, status, and configuration for pooled remote browser
//! sessions.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Opaque identifier for a pooled session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Category label partitioning the session pool into independent sub-pools
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolKey(String);

impl PoolKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PoolKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for PoolKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Browser session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Provisioning call is in flight
    Creating,
    /// Held by exactly one in-flight step
    Active,
    /// Owned by the pool, available to acquirers
    Idle,
    /// Failed a health probe or crossed the error threshold
    Unhealthy,
    /// Exceeded its time-to-live
    Expired,
    /// Destroyed; never resurrected
    Closed,
    /// Provisioning failed
    Error,
}

impl SessionStatus {
    /// Check if the pool may hand this session to an acquirer
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Check if the session should be replaced and closed by the sweep
    pub fn needs_replacement(&self) -> bool {
        matches!(self, Self::Unhealthy | Self::Expired | Self::Error)
    }

    /// Check if this is a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creating => write!(f, "creating"),
            Self::Active => write!(f, "active"),
            Self::Idle => write!(f, "idle"),
            Self::Unhealthy => write!(f, "unhealthy"),
            Self::Expired => write!(f, "expired"),
            Self::Closed => write!(f, "closed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Viewport dimensions requested at session creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Configuration passed to the provisioning capability when creating a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub keep_alive: bool,
    pub stealth: bool,
    pub proxies: bool,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    /// Human-readable label forwarded to the provider
    pub label: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keep_alive: true,
            stealth: true,
            proxies: true,
            viewport: Viewport::default(),
            user_agent: None,
            label: None,
        }
    }
}

impl SessionConfig {
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }
}

/// Pool-side record of one remote browser session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub pool_key: PoolKey,
    pub status: SessionStatus,
    pub config: SessionConfig,
    /// Identifier assigned by the remote provisioning service
    pub provider_session_id: Option<String>,
    pub connect_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub last_health_check_at: DateTime<Utc>,
    pub error_count: u32,
}

impl SessionInfo {
    pub fn new(pool_key: PoolKey, config: SessionConfig, ttl: Duration) -> Self {
        let now = Utc::now();
        let ttl = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(1800));
        Self {
            id: SessionId::new(),
            pool_key,
            status: SessionStatus::Creating,
            config,
            provider_session_id: None,
            connect_url: None,
            created_at: now,
            expires_at: now + ttl,
            last_used_at: now,
            last_health_check_at: now,
            error_count: 0,
        }
    }

    /// Check whether the session has outlived its TTL
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// How long the session has been idle
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_used_at).to_std().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_creating_with_ttl() {
        let info = SessionInfo::new(
            PoolKey::from("job_discovery"),
            SessionConfig::default(),
            Duration::from_secs(60),
        );
        assert_eq!(info.status, SessionStatus::Creating);
        assert!(!info.is_expired(Utc::now()));
        assert!(info.is_expired(Utc::now() + ChronoDuration::seconds(61)));
    }

    #[test]
    fn status_availability() {
        assert!(SessionStatus::Idle.is_available());
        assert!(!SessionStatus::Active.is_available());
        assert!(SessionStatus::Unhealthy.needs_replacement());
        assert!(SessionStatus::Expired.needs_replacement());
        assert!(!SessionStatus::Idle.needs_replacement());
    }
}
