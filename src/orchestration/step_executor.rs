//! # Step Executor
//!
//! Runs one attempt of one workflow step: acquires the session the step
//! declares (if any), invokes the registered action under the step's timeout,
//! and always returns the session to the pool, even when the action errors or
//! the attempt is abandoned during cancellation. Acquire/release is balanced
//! by construction: the executor is the only component that ever holds an
//! [`AcquiredSession`].
//!
//! A session that cannot be acquired is not a step failure; the attempt is
//! reported as [`StepAttemptResult::SessionUnavailable`] and the scheduler
//! requeues the step without consuming its retry budget.

use crate::models::execution::ExecutionId;
use crate::models::workflow::{StepId, StepResource, WorkflowStep};
use crate::orchestration::types::{StepAttemptResult, StepOutcome};
use crate::pool::session_pool::{AcquiredSession, SessionOutcome, SessionPool};
use crate::registry::action_registry::{ActionRegistry, StepActionContext, StepActionError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};

/// One admitted step attempt, handed to the executor by the scheduler loop
#[derive(Debug)]
pub struct StepAttemptRequest {
    pub execution_id: ExecutionId,
    pub step: WorkflowStep,
    /// Effective action timeout (step override or scheduler default)
    pub timeout: Duration,
    pub attempt: u32,
    pub prior_outputs: HashMap<StepId, Value>,
}

/// Executes individual step attempts against the pool and the action registry
pub struct StepExecutor {
    pool: Arc<SessionPool>,
    registry: Arc<ActionRegistry>,
    cancel_grace_period: Duration,
}

impl StepExecutor {
    pub fn new(
        pool: Arc<SessionPool>,
        registry: Arc<ActionRegistry>,
        cancel_grace_period: Duration,
    ) -> Self {
        Self {
            pool,
            registry,
            cancel_grace_period,
        }
    }

    /// Run one attempt to completion. `cancel` flips to `true` when the
    /// execution is being cancelled; the in-flight action then gets the grace
    /// period to finish before the attempt is abandoned and its session is
    /// force-released as unhealthy.
    pub async fn run_attempt(
        &self,
        request: StepAttemptRequest,
        mut cancel: watch::Receiver<bool>,
    ) -> StepOutcome {
        let started = Instant::now();
        let step_id = request.step.id.clone();

        let session: Option<AcquiredSession> = match &request.step.resource {
            StepResource::None => None,
            StepResource::Session(pool_key) => {
                // wait at most the step's own timeout, bounded by the pool's
                // default budget so a step with a huge timeout cannot pin an
                // acquire slot for minutes
                let acquire_timeout = request.timeout.min(self.pool.config().acquire_timeout);
                match self.pool.acquire(pool_key, acquire_timeout).await {
                    Ok(session) => Some(session),
                    Err(e) if e.is_transient() => {
                        debug!(
                            execution_id = %request.execution_id,
                            step_id = %step_id,
                            error = %e,
                            "EXECUTOR: Session unavailable, step requeued"
                        );
                        return StepOutcome {
                            step_id,
                            result: StepAttemptResult::SessionUnavailable(e.to_string()),
                            session: None,
                            duration: started.elapsed(),
                        };
                    }
                    Err(e) => {
                        // a hard provisioning failure consumes the attempt so
                        // the step cannot spin forever against a dead provider
                        return StepOutcome {
                            step_id,
                            result: StepAttemptResult::Failed(e.to_string()),
                            session: None,
                            duration: started.elapsed(),
                        };
                    }
                }
            }
        };

        let ctx = StepActionContext {
            execution_id: request.execution_id,
            step_id: step_id.clone(),
            parameters: request.step.parameters.clone(),
            session: session.as_ref().map(AcquiredSession::to_ref),
            prior_outputs: request.prior_outputs,
            context: self.pool.context(),
        };

        debug!(
            execution_id = %request.execution_id,
            step_id = %step_id,
            action = %request.step.action,
            attempt = request.attempt,
            "EXECUTOR: Invoking action"
        );

        let timed = tokio::time::timeout(
            request.timeout,
            self.registry.execute(&request.step.action, ctx),
        );
        tokio::pin!(timed);

        let result = tokio::select! {
            res = &mut timed => classify(res, request.timeout),
            _ = cancelled(&mut cancel) => {
                debug!(
                    step_id = %step_id,
                    grace_ms = self.cancel_grace_period.as_millis() as u64,
                    "EXECUTOR: Cancellation observed, granting grace period"
                );
                match tokio::time::timeout(self.cancel_grace_period, &mut timed).await {
                    Ok(res) => classify(res, request.timeout),
                    Err(_) => {
                        warn!(step_id = %step_id, "EXECUTOR: Grace period expired, abandoning step");
                        StepAttemptResult::Abandoned
                    }
                }
            }
        };

        let session_id = session.as_ref().map(AcquiredSession::id);
        if let Some(session) = session {
            let outcome = match &result {
                StepAttemptResult::Succeeded(_) => SessionOutcome::Success,
                StepAttemptResult::Failed(_) => SessionOutcome::Failure,
                StepAttemptResult::Abandoned => SessionOutcome::Abandoned,
                StepAttemptResult::SessionUnavailable(_) => SessionOutcome::Success,
            };
            self.pool.release(session, outcome).await;
        }

        StepOutcome {
            step_id,
            result,
            session: session_id,
            duration: started.elapsed(),
        }
    }
}

fn classify(
    res: Result<Result<Value, StepActionError>, tokio::time::error::Elapsed>,
    timeout: Duration,
) -> StepAttemptResult {
    match res {
        Ok(Ok(output)) => StepAttemptResult::Succeeded(output),
        Ok(Err(e)) => StepAttemptResult::Failed(e.to_string()),
        Err(_) => StepAttemptResult::Failed(format!(
            "action timed out after {}ms",
            timeout.as_millis()
        )),
    }
}

/// Resolves once the cancel signal flips to true; pends forever otherwise
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if *rx.borrow() {
        return;
    }
    loop {
        if rx.changed().await.is_err() {
            // sender dropped without cancelling; the attempt just runs out
            std::future::pending::<()>().await;
        }
        if *rx.borrow() {
            return;
        }
    }
}
