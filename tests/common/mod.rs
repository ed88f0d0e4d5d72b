//! Shared test infrastructure: a scriptable stub provisioner, recording and
//! failing step actions, and fast configuration profiles.
#![allow(dead_code)]

use async_trait::async_trait;
use director_core::config::DirectorConfig;
use director_core::models::execution::ExecutionId;
use director_core::models::session::SessionConfig;
use director_core::orchestration::{Director, ExecutionStatusView};
use director_core::pool::provisioner::{
    ProvisionedSession, ProvisionerError, SessionProvisioner,
};
use director_core::registry::{StepAction, StepActionContext, StepActionError};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Stub provisioner with scriptable failure behavior
#[derive(Default)]
pub struct StubProvisioner {
    counter: AtomicUsize,
    /// Fail this many creation calls before succeeding again
    fail_next: AtomicUsize,
    /// Fail every creation call while set
    always_fail: AtomicBool,
    /// Provider ids that report unhealthy on probe
    unhealthy: Mutex<HashSet<String>>,
    closed: Mutex<Vec<String>>,
}

impl StubProvisioner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_creates(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn set_always_fail(&self, fail: bool) {
        self.always_fail.store(fail, Ordering::SeqCst);
    }

    pub fn mark_unhealthy(&self, provider_id: &str) {
        self.unhealthy.lock().insert(provider_id.to_string());
    }

    pub fn created_count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn closed_ids(&self) -> Vec<String> {
        self.closed.lock().clone()
    }
}

#[async_trait]
impl SessionProvisioner for StubProvisioner {
    async fn create(&self, _config: &SessionConfig) -> Result<ProvisionedSession, ProvisionerError> {
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(ProvisionerError::Request("provider unavailable".into()));
        }
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(ProvisionerError::Request("transient create failure".into()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(ProvisionedSession {
            provider_session_id: format!("prov-{n}"),
            connect_url: Some(format!("wss://stub.invalid/sessions/prov-{n}")),
        })
    }

    async fn health_check(&self, provider_session_id: &str) -> Result<bool, ProvisionerError> {
        Ok(!self.unhealthy.lock().contains(provider_session_id))
    }

    async fn close(&self, provider_session_id: &str) -> Result<(), ProvisionerError> {
        self.closed.lock().push(provider_session_id.to_string());
        Ok(())
    }
}

/// Records invocation order and tracks concurrent invocations; optionally
/// sleeps for `delay_ms` from its parameters before returning.
pub struct RecordingAction {
    pub invocations: Arc<Mutex<Vec<String>>>,
    current: Arc<AtomicUsize>,
    pub max_concurrent: Arc<AtomicUsize>,
}

impl RecordingAction {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            invocations: Arc::new(Mutex::new(Vec::new())),
            current: Arc::new(AtomicUsize::new(0)),
            max_concurrent: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn invocation_order(&self) -> Vec<String> {
        self.invocations.lock().clone()
    }

    pub fn invocation_count_for(&self, step_id: &str) -> usize {
        self.invocations
            .lock()
            .iter()
            .filter(|s| s.as_str() == step_id)
            .count()
    }

    pub fn observed_max_concurrency(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepAction for RecordingAction {
    async fn execute(&self, ctx: StepActionContext) -> Result<Value, StepActionError> {
        self.invocations.lock().push(ctx.step_id.clone());
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);

        let delay = ctx
            .parameters
            .get("delay_ms")
            .and_then(Value::as_u64)
            .unwrap_or(5);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(json!({"step": ctx.step_id, "ok": true}))
    }
}

/// Fails a configured number of times, then succeeds
pub struct FlakyAction {
    remaining_failures: AtomicU32,
}

impl FlakyAction {
    pub fn failing(times: u32) -> Arc<Self> {
        Arc::new(Self {
            remaining_failures: AtomicU32::new(times),
        })
    }
}

#[async_trait]
impl StepAction for FlakyAction {
    async fn execute(&self, ctx: StepActionContext) -> Result<Value, StepActionError> {
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StepActionError::Failed(format!(
                "induced failure for step {}",
                ctx.step_id
            )));
        }
        Ok(json!({"recovered": true}))
    }
}

/// Always fails
pub struct FailingAction;

#[async_trait]
impl StepAction for FailingAction {
    async fn execute(&self, ctx: StepActionContext) -> Result<Value, StepActionError> {
        Err(StepActionError::Failed(format!(
            "step {} always fails",
            ctx.step_id
        )))
    }
}

/// Touches the session it was handed: asserts one is present, stores a
/// context marker, and echoes the provider session id.
pub struct SessionTouchAction;

#[async_trait]
impl StepAction for SessionTouchAction {
    async fn execute(&self, ctx: StepActionContext) -> Result<Value, StepActionError> {
        let session = ctx
            .session
            .as_ref()
            .ok_or_else(|| StepActionError::Failed("no session provided".into()))?;
        ctx.context
            .store(session.id, "visited_by", json!(ctx.step_id));
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(json!({"provider_session_id": session.provider_session_id}))
    }
}

/// Configuration tuned for fast tests: tight tick, tiny backoffs, manual
/// health sweeps (the interval is long; tests call `sweep_once` directly).
pub fn quick_config() -> DirectorConfig {
    let mut config = DirectorConfig::default();
    config.pool.min_warm = 0;
    config.pool.max_size = 4;
    config.pool.acquire_timeout = Duration::from_millis(500);
    config.pool.create_retries = 0;
    config.pool.create_backoff_base = Duration::from_millis(5);
    config.pool.create_backoff_max = Duration::from_millis(20);
    config.pool.health_sweep_interval = Duration::from_secs(3600);
    config.scheduler.tick_interval = Duration::from_millis(10);
    config.scheduler.retry_backoff_base = Duration::from_millis(10);
    config.scheduler.retry_backoff_max = Duration::from_millis(40);
    config.scheduler.cancel_grace_period = Duration::from_millis(100);
    config
}

/// Poll an execution until it reaches a terminal state
pub async fn wait_terminal(director: &Director, execution_id: ExecutionId) -> ExecutionStatusView {
    for _ in 0..1000 {
        let view = director
            .status(execution_id)
            .await
            .expect("execution status should be readable");
        if view.status.is_terminal() {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("execution {execution_id} did not reach a terminal state");
}
