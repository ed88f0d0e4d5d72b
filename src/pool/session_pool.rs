//! # Session Pool
//!
//! Bounded pools of remote browser sessions, partitioned by pool key. The
//! pool owns the full session lifecycle: creation through the provisioning
//! capability (with retry, backoff, and circuit breaking), Idle ⇄ Active
//! hand-off to steps, error accounting, and replacement of unhealthy or
//! expired sessions with their context copied over.
//!
//! ## Serialization
//!
//! All per-key state (session table, idle queue, in-flight creation count)
//! lives behind a single async mutex per pool key. That mutex is the one
//! point of serialization that makes double-acquisition of an Idle session
//! impossible; no caller ever sees the table directly.
//!
//! ## Failure semantics
//!
//! Acquisition failures are returned to the caller (the scheduler retries on
//! its next tick). Creation failures are retried here with exponential
//! backoff; once the provisioning circuit opens the pool key is degraded and
//! `acquire` fails fast with [`PoolError::Degraded`] until the breaker's
//! half-open probe heals it.

use crate::config::PoolConfig;
use crate::constants::events;
use crate::events::EventPublisher;
use crate::models::session::{PoolKey, SessionConfig, SessionId, SessionInfo, SessionStatus};
use crate::orchestration::backoff::BackoffCalculator;
use crate::pool::context::ContextStore;
use crate::pool::provisioner::{ProvisionerError, SessionProvisioner};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info, warn};

/// How a step used the session it is returning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The action completed; the session goes back to Idle
    Success,
    /// The action failed; the session's error count is incremented
    Failure,
    /// The step was abandoned mid-action; the session's state is unknown and
    /// it is retired as Unhealthy
    Abandoned,
}

/// Errors surfaced by pool operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    #[error("session pool '{pool_key}' is degraded: {reason}")]
    Degraded { pool_key: PoolKey, reason: String },
    #[error("no session available for pool '{pool_key}'")]
    NoSessionAvailable { pool_key: PoolKey },
    #[error("timed out after {waited_ms}ms acquiring a session for pool '{pool_key}'")]
    AcquireTimeout { pool_key: PoolKey, waited_ms: u64 },
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
    #[error(transparent)]
    Provisioner(#[from] ProvisionerError),
}

impl PoolError {
    /// Transient errors are absorbed by the scheduler and retried on the next
    /// tick without consuming a step attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NoSessionAvailable { .. } | Self::AcquireTimeout { .. } | Self::Degraded { .. }
        )
    }
}

/// Exclusive handle to an Active session, held by exactly one step
#[derive(Debug)]
pub struct AcquiredSession {
    id: SessionId,
    pool_key: PoolKey,
    provider_session_id: String,
    connect_url: Option<String>,
}

impl AcquiredSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn pool_key(&self) -> &PoolKey {
        &self.pool_key
    }

    pub fn provider_session_id(&self) -> &str {
        &self.provider_session_id
    }

    pub fn connect_url(&self) -> Option<&str> {
        self.connect_url.as_deref()
    }

    /// Cloneable reference passed to step actions
    pub fn to_ref(&self) -> SessionRef {
        SessionRef {
            id: self.id,
            pool_key: self.pool_key.clone(),
            provider_session_id: self.provider_session_id.clone(),
            connect_url: self.connect_url.clone(),
        }
    }
}

/// Read-only view of an acquired session, safe to hand to action code
#[derive(Debug, Clone)]
pub struct SessionRef {
    pub id: SessionId,
    pub pool_key: PoolKey,
    pub provider_session_id: String,
    pub connect_url: Option<String>,
}

/// Per-key statistics exposed to status consumers
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolKeyStats {
    pub idle: usize,
    pub active: usize,
    pub unhealthy: usize,
    pub total: usize,
    pub degraded: bool,
}

/// Statistics for every pool key
pub type PoolStats = HashMap<String, PoolKeyStats>;

/// Mutable state for one pool key, guarded by a single mutex
struct KeyedState {
    sessions: HashMap<SessionId, SessionInfo>,
    idle: VecDeque<SessionId>,
    /// Provisioning calls in flight; counted toward the size cap
    creating: usize,
}

impl KeyedState {
    fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            idle: VecDeque::new(),
            creating: 0,
        }
    }
}

pub(crate) struct KeyEntry {
    state: Mutex<KeyedState>,
    notify: Notify,
    breaker: CircuitBreaker,
}

/// Pool of remote browser sessions partitioned by pool key
pub struct SessionPool {
    provisioner: Arc<dyn SessionProvisioner>,
    config: PoolConfig,
    keys: DashMap<PoolKey, Arc<KeyEntry>>,
    context: Arc<ContextStore>,
    events: EventPublisher,
    closed: AtomicBool,
}

impl SessionPool {
    pub fn new(
        provisioner: Arc<dyn SessionProvisioner>,
        config: PoolConfig,
        events: EventPublisher,
    ) -> Self {
        Self {
            provisioner,
            config,
            keys: DashMap::new(),
            context: Arc::new(ContextStore::new()),
            events,
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Session-scoped context store, shared with step actions
    pub fn context(&self) -> Arc<ContextStore> {
        Arc::clone(&self.context)
    }

    /// Store a context value for a session
    pub fn store_context(&self, session_id: SessionId, key: impl Into<String>, value: Value) {
        self.context.store(session_id, key, value);
    }

    /// Read a context value for a session
    pub fn get_context(&self, session_id: SessionId, key: &str) -> Option<Value> {
        self.context.get(session_id, key)
    }

    fn entry(&self, pool_key: &PoolKey) -> Arc<KeyEntry> {
        self.keys
            .entry(pool_key.clone())
            .or_insert_with(|| {
                Arc::new(KeyEntry {
                    state: Mutex::new(KeyedState::new()),
                    notify: Notify::new(),
                    breaker: CircuitBreaker::new(
                        format!("provisioner:{pool_key}"),
                        CircuitBreakerConfig {
                            failure_threshold: self.config.degraded_threshold,
                            reset_timeout: self.config.degraded_reset_timeout,
                            success_threshold: 1,
                        },
                    ),
                })
            })
            .clone()
    }

    fn entries(&self) -> Vec<(PoolKey, Arc<KeyEntry>)> {
        self.keys
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Pre-warm `min_warm` sessions for each pool key, keys in parallel
    pub async fn initialize(self: &Arc<Self>, pool_keys: &[PoolKey]) {
        info!(
            keys = pool_keys.len(),
            min_warm = self.config.min_warm,
            "🏊 POOL: Initializing session pools"
        );
        let warmups = pool_keys.iter().map(|pool_key| {
            let pool = Arc::clone(self);
            let pool_key = pool_key.clone();
            async move {
                let entry = pool.entry(&pool_key);
                let warmed = pool.warm_up(&entry, &pool_key).await;
                (pool_key, warmed)
            }
        });
        for (pool_key, warmed) in futures::future::join_all(warmups).await {
            info!(
                pool_key = %pool_key,
                warmed,
                "✅ POOL: Pool key initialized"
            );
        }
    }

    /// Create sessions until the pool key reaches its warm floor.
    /// Returns how many sessions were created.
    async fn warm_up(self: &Arc<Self>, entry: &Arc<KeyEntry>, pool_key: &PoolKey) -> usize {
        let deficit = {
            let mut state = entry.state.lock().await;
            let live = state.sessions.len() + state.creating;
            let deficit = self.config.min_warm.saturating_sub(live);
            state.creating += deficit;
            deficit
        };

        let mut created = 0;
        for _ in 0..deficit {
            match self.create_session(entry, pool_key).await {
                Ok(mut session) => {
                    session.status = SessionStatus::Idle;
                    let id = session.id;
                    let mut state = entry.state.lock().await;
                    state.creating -= 1;
                    state.sessions.insert(id, session);
                    state.idle.push_back(id);
                    drop(state);
                    entry.notify.notify_one();
                    created += 1;
                }
                Err(e) => {
                    let mut state = entry.state.lock().await;
                    state.creating -= 1;
                    drop(state);
                    error!(pool_key = %pool_key, error = %e, "❌ POOL: Warm-up creation failed");
                    break;
                }
            }
        }
        created
    }

    /// Acquire an Idle session for `pool_key`, creating one if the pool is
    /// below its cap, or waiting until a release or the timeout.
    ///
    /// A zero timeout never waits: it returns
    /// [`PoolError::NoSessionAvailable`] when nothing is immediately idle.
    pub async fn acquire(
        &self,
        pool_key: &PoolKey,
        timeout: Duration,
    ) -> Result<AcquiredSession, PoolError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::NoSessionAvailable {
                pool_key: pool_key.clone(),
            });
        }

        let entry = self.entry(pool_key);
        let deadline = Instant::now() + timeout;

        loop {
            let mut create_slot = false;
            {
                let mut state = entry.state.lock().await;
                let now = Utc::now();

                while let Some(id) = state.idle.pop_front() {
                    let acquired = match state.sessions.get_mut(&id) {
                        Some(info) if info.status == SessionStatus::Idle => {
                            if info.is_expired(now) {
                                // expired while queued; leave it for the sweep
                                info.status = SessionStatus::Expired;
                                None
                            } else {
                                info.status = SessionStatus::Active;
                                info.last_used_at = now;
                                Some(AcquiredSession {
                                    id,
                                    pool_key: pool_key.clone(),
                                    provider_session_id: info
                                        .provider_session_id
                                        .clone()
                                        .unwrap_or_default(),
                                    connect_url: info.connect_url.clone(),
                                })
                            }
                        }
                        // marked unhealthy/expired while queued, or already closed
                        _ => None,
                    };
                    if let Some(acquired) = acquired {
                        debug!(
                            session_id = %acquired.id,
                            pool_key = %pool_key,
                            "POOL: Session acquired from idle queue"
                        );
                        return Ok(acquired);
                    }
                }

                if state.sessions.len() + state.creating < self.config.max_size {
                    state.creating += 1;
                    create_slot = true;
                }
            }

            if create_slot {
                match self.create_session(&entry, pool_key).await {
                    Ok(mut session) => {
                        session.status = SessionStatus::Active;
                        session.last_used_at = Utc::now();
                        let acquired = AcquiredSession {
                            id: session.id,
                            pool_key: pool_key.clone(),
                            provider_session_id: session
                                .provider_session_id
                                .clone()
                                .unwrap_or_default(),
                            connect_url: session.connect_url.clone(),
                        };
                        let mut state = entry.state.lock().await;
                        state.creating -= 1;
                        state.sessions.insert(session.id, session);
                        return Ok(acquired);
                    }
                    Err(e) => {
                        {
                            let mut state = entry.state.lock().await;
                            state.creating -= 1;
                        }
                        // wake another waiter so the freed slot is not lost
                        entry.notify.notify_one();
                        if matches!(e, PoolError::Degraded { .. }) {
                            return Err(e);
                        }
                        if Instant::now() >= deadline {
                            return Err(e);
                        }
                        continue;
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(if timeout.is_zero() {
                    PoolError::NoSessionAvailable {
                        pool_key: pool_key.clone(),
                    }
                } else {
                    PoolError::AcquireTimeout {
                        pool_key: pool_key.clone(),
                        waited_ms: timeout.as_millis() as u64,
                    }
                });
            }
            let _ = tokio::time::timeout(deadline - now, entry.notify.notified()).await;
        }
    }

    /// Return a session after a step attempt. Healthy sessions go back to
    /// Idle; error-threshold crossings and abandonment retire the session and
    /// schedule an asynchronous replacement.
    pub async fn release(self: &Arc<Self>, session: AcquiredSession, outcome: SessionOutcome) {
        let Some(entry) = self.keys.get(&session.pool_key).map(|e| e.value().clone()) else {
            warn!(session_id = %session.id, "POOL: Release for unknown pool key");
            return;
        };

        let mut retire = false;
        {
            let mut state = entry.state.lock().await;
            let Some(info) = state.sessions.get_mut(&session.id) else {
                warn!(session_id = %session.id, "POOL: Release for unknown session");
                return;
            };
            let now = Utc::now();
            info.last_used_at = now;

            match outcome {
                SessionOutcome::Success => {}
                SessionOutcome::Failure => {
                    info.error_count += 1;
                    if info.error_count >= self.config.error_threshold
                        && info.status == SessionStatus::Active
                    {
                        info.status = SessionStatus::Unhealthy;
                        warn!(
                            session_id = %session.id,
                            error_count = info.error_count,
                            "⚠️ POOL: Session crossed error threshold"
                        );
                        self.events.publish(
                            events::SESSION_UNHEALTHY,
                            json!({
                                "session_id": session.id.to_string(),
                                "pool_key": session.pool_key.as_str(),
                                "error_count": info.error_count,
                            }),
                        );
                    }
                }
                SessionOutcome::Abandoned => {
                    info.status = SessionStatus::Unhealthy;
                    warn!(
                        session_id = %session.id,
                        "⚠️ POOL: Session abandoned mid-action, retiring"
                    );
                    self.events.publish(
                        events::SESSION_UNHEALTHY,
                        json!({
                            "session_id": session.id.to_string(),
                            "pool_key": session.pool_key.as_str(),
                            "reason": "abandoned",
                        }),
                    );
                }
            }

            let mut push_idle = false;
            if info.status == SessionStatus::Active {
                if info.is_expired(now) {
                    info.status = SessionStatus::Expired;
                } else {
                    info.status = SessionStatus::Idle;
                    push_idle = true;
                }
            }
            let needs_replacement = info.status.needs_replacement();
            if push_idle {
                state.idle.push_back(session.id);
            }
            if needs_replacement {
                retire = true;
            }
        }

        if retire {
            let pool = Arc::clone(self);
            let pool_key = session.pool_key.clone();
            let old_id = session.id;
            tokio::spawn(async move {
                pool.replace_session(&entry, &pool_key, old_id).await;
            });
        } else {
            debug!(session_id = %session.id, "POOL: Session released to idle");
            entry.notify.notify_one();
        }
    }

    /// Create a session through the provisioner, retrying with exponential
    /// backoff. Consecutive failures trip the pool key's circuit breaker.
    async fn create_session(
        &self,
        entry: &Arc<KeyEntry>,
        pool_key: &PoolKey,
    ) -> Result<SessionInfo, PoolError> {
        if !entry.breaker.allow() {
            return Err(PoolError::Degraded {
                pool_key: pool_key.clone(),
                reason: "session creation circuit is open".to_string(),
            });
        }

        let backoff = BackoffCalculator::new(
            self.config.create_backoff_base,
            self.config.create_backoff_max,
        );
        let session_config = SessionConfig::labeled(format!("{pool_key}_session"));
        let mut attempt: u32 = 0;

        loop {
            match self.provisioner.create(&session_config).await {
                Ok(provisioned) => {
                    let recovered = entry.breaker.state() == CircuitState::HalfOpen;
                    entry.breaker.record_success();
                    if recovered && entry.breaker.state() == CircuitState::Closed {
                        info!(pool_key = %pool_key, "✅ POOL: Pool key recovered from degradation");
                        self.events.publish(
                            events::POOL_RECOVERED,
                            json!({"pool_key": pool_key.as_str()}),
                        );
                    }

                    let mut info = SessionInfo::new(
                        pool_key.clone(),
                        session_config.clone(),
                        self.config.session_ttl,
                    );
                    info.provider_session_id = Some(provisioned.provider_session_id);
                    info.connect_url = provisioned.connect_url;
                    info!(
                        session_id = %info.id,
                        pool_key = %pool_key,
                        "✅ POOL: Created session"
                    );
                    self.events.publish(
                        events::SESSION_CREATED,
                        json!({
                            "session_id": info.id.to_string(),
                            "pool_key": pool_key.as_str(),
                        }),
                    );
                    return Ok(info);
                }
                Err(e) => {
                    entry.breaker.record_failure();
                    if entry.breaker.state() == CircuitState::Open {
                        error!(
                            pool_key = %pool_key,
                            error = %e,
                            "❌ POOL: Pool key degraded, session creation failing fast"
                        );
                        self.events.publish(
                            events::POOL_DEGRADED,
                            json!({"pool_key": pool_key.as_str(), "error": e.to_string()}),
                        );
                        return Err(PoolError::Degraded {
                            pool_key: pool_key.clone(),
                            reason: e.to_string(),
                        });
                    }
                    if attempt >= self.config.create_retries {
                        return Err(PoolError::Provisioner(e));
                    }
                    let delay = backoff.delay_for(attempt);
                    warn!(
                        pool_key = %pool_key,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "POOL: Session creation failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Replace a retired session: claim it, create a successor, copy the old
    /// session's context onto it, then close the old one. Claiming first
    /// makes concurrent replacement attempts for the same session collapse to
    /// one winner.
    pub(crate) async fn replace_session(
        self: &Arc<Self>,
        entry: &Arc<KeyEntry>,
        pool_key: &PoolKey,
        old_id: SessionId,
    ) {
        let old_info = {
            let mut state = entry.state.lock().await;
            state.idle.retain(|id| *id != old_id);
            let claimed = state.sessions.remove(&old_id);
            if claimed.is_some() {
                // hold a creation slot so acquirers cannot over-provision
                // past the cap while the successor is being created
                state.creating += 1;
            }
            claimed
        };
        let Some(old_info) = old_info else {
            // another replacer already claimed it
            return;
        };

        match self.create_session(entry, pool_key).await {
            Ok(mut replacement) => {
                replacement.status = SessionStatus::Idle;
                let new_id = replacement.id;
                self.context.copy(old_id, new_id);
                {
                    let mut state = entry.state.lock().await;
                    state.creating -= 1;
                    state.sessions.insert(new_id, replacement);
                    state.idle.push_back(new_id);
                }
                entry.notify.notify_one();
                info!(
                    old_session_id = %old_id,
                    new_session_id = %new_id,
                    pool_key = %pool_key,
                    "🔄 POOL: Session replaced"
                );
                self.events.publish(
                    events::SESSION_REPLACED,
                    json!({
                        "old_session_id": old_id.to_string(),
                        "new_session_id": new_id.to_string(),
                        "pool_key": pool_key.as_str(),
                    }),
                );
            }
            Err(e) => {
                {
                    let mut state = entry.state.lock().await;
                    state.creating -= 1;
                }
                entry.notify.notify_one();
                error!(
                    session_id = %old_id,
                    pool_key = %pool_key,
                    error = %e,
                    "❌ POOL: Replacement creation failed; closing without successor"
                );
            }
        }

        if let Some(provider_id) = &old_info.provider_session_id {
            if let Err(e) = self.provisioner.close(provider_id).await {
                warn!(session_id = %old_id, error = %e, "POOL: Provider close failed");
            }
        }
        self.context.remove(old_id);
        self.events.publish(
            events::SESSION_CLOSED,
            json!({
                "session_id": old_id.to_string(),
                "pool_key": pool_key.as_str(),
            }),
        );
    }

    /// Remove a session from the pool and close it at the provider
    pub(crate) async fn close_session(
        &self,
        entry: &Arc<KeyEntry>,
        pool_key: &PoolKey,
        session_id: SessionId,
    ) {
        let provider_session_id = {
            let mut state = entry.state.lock().await;
            state.idle.retain(|id| *id != session_id);
            state
                .sessions
                .remove(&session_id)
                .and_then(|info| info.provider_session_id)
        };

        if let Some(provider_id) = provider_session_id {
            if let Err(e) = self.provisioner.close(&provider_id).await {
                warn!(
                    session_id = %session_id,
                    error = %e,
                    "POOL: Provider close failed"
                );
            }
        }
        self.context.remove(session_id);
        debug!(session_id = %session_id, pool_key = %pool_key, "POOL: Session closed");
        self.events.publish(
            events::SESSION_CLOSED,
            json!({
                "session_id": session_id.to_string(),
                "pool_key": pool_key.as_str(),
            }),
        );
    }

    /// One pass of the health sweep across every pool key. Invoked on a fixed
    /// interval by the [`crate::pool::health::HealthMonitor`]; public so
    /// tests can drive it deterministically.
    pub async fn sweep_once(self: &Arc<Self>) {
        for (pool_key, entry) in self.entries() {
            self.sweep_key(&pool_key, &entry).await;
        }
    }

    async fn sweep_key(self: &Arc<Self>, pool_key: &PoolKey, entry: &Arc<KeyEntry>) {
        let now = Utc::now();
        let mut to_probe: Vec<(SessionId, String)> = Vec::new();
        let mut to_replace: Vec<SessionId> = Vec::new();
        let mut to_close: Vec<SessionId> = Vec::new();

        {
            let mut state = entry.state.lock().await;
            let mut live = state.sessions.len() + state.creating;

            for (id, info) in state.sessions.iter_mut() {
                match info.status {
                    SessionStatus::Idle => {
                        if info.is_expired(now) {
                            info.status = SessionStatus::Expired;
                            self.events.publish(
                                events::SESSION_EXPIRED,
                                json!({
                                    "session_id": id.to_string(),
                                    "pool_key": pool_key.as_str(),
                                }),
                            );
                            to_replace.push(*id);
                        } else if info.idle_for(now) > self.config.max_idle
                            && live > self.config.min_warm
                        {
                            // surplus idle capacity above the warm floor
                            to_close.push(*id);
                            live -= 1;
                        } else if let Some(provider_id) = &info.provider_session_id {
                            to_probe.push((*id, provider_id.clone()));
                        }
                    }
                    // Active sessions are left alone: the step holding one
                    // re-checks expiry at release, so Expired always means
                    // unreferenced here
                    SessionStatus::Active => {}
                    SessionStatus::Unhealthy | SessionStatus::Error | SessionStatus::Expired => {
                        // marked outside the sweep but not yet retired
                        to_replace.push(*id);
                    }
                    _ => {}
                }
            }
            state
                .idle
                .retain(|id| !to_replace.contains(id) && !to_close.contains(id));
        }

        for (id, provider_id) in to_probe {
            let healthy = match self.provisioner.health_check(&provider_id).await {
                Ok(healthy) => healthy,
                Err(e) => {
                    warn!(session_id = %id, error = %e, "POOL: Health probe errored");
                    false
                }
            };
            let mut state = entry.state.lock().await;
            if let Some(info) = state.sessions.get_mut(&id) {
                info.last_health_check_at = Utc::now();
                if !healthy && info.status == SessionStatus::Idle {
                    info.status = SessionStatus::Unhealthy;
                    state.idle.retain(|queued| *queued != id);
                    to_replace.push(id);
                    warn!(session_id = %id, pool_key = %pool_key, "⚠️ POOL: Probe failed");
                    self.events.publish(
                        events::SESSION_UNHEALTHY,
                        json!({
                            "session_id": id.to_string(),
                            "pool_key": pool_key.as_str(),
                            "reason": "probe_failed",
                        }),
                    );
                }
            }
        }

        for id in to_replace {
            self.replace_session(entry, pool_key, id).await;
        }
        for id in to_close {
            self.close_session(entry, pool_key, id).await;
        }

        // hold the warm floor after reclamation
        self.warm_up(entry, pool_key).await;
    }

    /// Per-key statistics for status consumers
    pub async fn stats(&self) -> PoolStats {
        let mut stats = PoolStats::new();
        for (pool_key, entry) in self.entries() {
            let state = entry.state.lock().await;
            let mut key_stats = PoolKeyStats {
                degraded: entry.breaker.state() == CircuitState::Open,
                total: state.sessions.len(),
                ..Default::default()
            };
            for info in state.sessions.values() {
                match info.status {
                    SessionStatus::Idle => key_stats.idle += 1,
                    SessionStatus::Active => key_stats.active += 1,
                    SessionStatus::Unhealthy | SessionStatus::Expired | SessionStatus::Error => {
                        key_stats.unhealthy += 1
                    }
                    _ => {}
                }
            }
            stats.insert(pool_key.to_string(), key_stats);
        }
        stats
    }

    /// Snapshot of one session's record, if it is still pooled
    pub async fn session_info(&self, session_id: SessionId) -> Option<SessionInfo> {
        for (_, entry) in self.entries() {
            let state = entry.state.lock().await;
            if let Some(info) = state.sessions.get(&session_id) {
                return Some(info.clone());
            }
        }
        None
    }

    /// Close every session and refuse further acquisitions
    pub async fn shutdown(self: &Arc<Self>) {
        info!("🛑 POOL: Shutting down");
        self.closed.store(true, Ordering::Release);
        for (pool_key, entry) in self.entries() {
            let ids: Vec<SessionId> = {
                let state = entry.state.lock().await;
                state.sessions.keys().copied().collect()
            };
            for id in ids {
                self.close_session(&entry, &pool_key, id).await;
            }
            entry.notify.notify_waiters();
        }
        info!("✅ POOL: Shutdown complete");
    }
}
