//! # Director
//!
//! The orchestration engine: accepts workflow definitions, runs one scheduler
//! loop per execution, and exposes the status/control surface consumed by
//! API layers.
//!
//! ## Scheduling model
//!
//! Each execution owns a dedicated loop task. The loop is the only writer of
//! its execution record (guarded by one async mutex), which keeps checkpoints
//! consistent without cross-execution coordination; executions proceed fully
//! in parallel. On every pass the loop:
//!
//! 1. skips steps that can never run (upstream failure propagation),
//! 2. finishes the execution once every step is terminal,
//! 3. admits ready steps up to `max_concurrent_steps`, ordered by step
//!    priority then definition order,
//! 4. waits for a step outcome, a control change, the tick interval, or the
//!    global timeout.
//!
//! A checkpoint is written after every step-status transition with a
//! monotonically increasing sequence number; recovery rebuilds run-state from
//! the latest checkpoint and requeues in-flight steps with their attempt
//! counts preserved, so a succeeded step is never re-executed.

use crate::config::{DirectorConfig, SchedulerConfig};
use crate::constants::events;
use crate::events::EventPublisher;
use crate::models::execution::{
    ExecutionCheckpoint, ExecutionId, FailureSummary, WorkflowExecution,
};
use crate::models::session::PoolKey;
use crate::models::workflow::{StepId, WorkflowDefinition, WorkflowId, WorkflowStep};
use crate::orchestration::backoff::BackoffCalculator;
use crate::orchestration::checkpoint::{CheckpointStore, InMemoryCheckpointStore};
use crate::orchestration::errors::{OrchestrationError, OrchestrationResult};
use crate::orchestration::readiness;
use crate::orchestration::step_executor::{StepAttemptRequest, StepExecutor};
use crate::orchestration::types::{
    ExecutionStatusView, StepAttemptResult, StepOutcome, StepStatusView, SystemMetrics,
};
use crate::pool::health::HealthMonitor;
use crate::pool::provisioner::SessionProvisioner;
use crate::pool::session_pool::{PoolStats, SessionPool};
use crate::registry::action_registry::ActionRegistry;
use crate::state_machine::{
    step_transition, workflow_transition, StepEvent, StepState, WorkflowEvent, WorkflowState,
};
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

/// Loop-facing control signal for one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlState {
    Running,
    Paused,
    Cancelling,
}

/// Shared handle to one live execution
struct ExecutionHandle {
    workflow_id: WorkflowId,
    state: Mutex<WorkflowExecution>,
    control: watch::Sender<ControlState>,
    cancel: watch::Sender<bool>,
    task: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

#[derive(Debug, Default)]
struct Counters {
    completed: u64,
    failed: u64,
    cancelled: u64,
}

/// The orchestration engine
pub struct Director {
    config: DirectorConfig,
    pool: Arc<SessionPool>,
    registry: Arc<ActionRegistry>,
    checkpoints: Arc<dyn CheckpointStore>,
    events: EventPublisher,
    definitions: DashMap<WorkflowId, Arc<WorkflowDefinition>>,
    executions: Arc<DashMap<ExecutionId, Arc<ExecutionHandle>>>,
    history: Arc<parking_lot::Mutex<VecDeque<ExecutionStatusView>>>,
    counters: Arc<parking_lot::Mutex<Counters>>,
    health_monitor: parking_lot::Mutex<Option<HealthMonitor>>,
}

impl Director {
    pub fn new(config: DirectorConfig, provisioner: Arc<dyn SessionProvisioner>) -> Self {
        let events = EventPublisher::default();
        let pool = Arc::new(SessionPool::new(
            provisioner,
            config.pool.clone(),
            events.clone(),
        ));
        let checkpoints: Arc<dyn CheckpointStore> =
            Arc::new(InMemoryCheckpointStore::new(&config.checkpoint));
        Self {
            config,
            pool,
            registry: Arc::new(ActionRegistry::new()),
            checkpoints,
            events,
            definitions: DashMap::new(),
            executions: Arc::new(DashMap::new()),
            history: Arc::new(parking_lot::Mutex::new(VecDeque::new())),
            counters: Arc::new(parking_lot::Mutex::new(Counters::default())),
            health_monitor: parking_lot::Mutex::new(None),
        }
    }

    /// Swap the checkpoint store (defaults to the bounded in-memory store)
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = store;
        self
    }

    /// The action registry; implementations are registered here at startup
    pub fn registry(&self) -> Arc<ActionRegistry> {
        Arc::clone(&self.registry)
    }

    /// The underlying session pool
    pub fn pool(&self) -> Arc<SessionPool> {
        Arc::clone(&self.pool)
    }

    /// Lifecycle event stream
    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    /// Pre-warm session pools and start the background health sweep
    pub async fn initialize(&self, pool_keys: &[PoolKey]) {
        info!("🚀 DIRECTOR: Initializing");
        self.pool.initialize(pool_keys).await;
        let monitor = HealthMonitor::start(
            Arc::clone(&self.pool),
            self.config.pool.health_sweep_interval,
        );
        *self.health_monitor.lock() = Some(monitor);
        info!("✅ DIRECTOR: Initialized");
    }

    /// Register a workflow definition. The DAG is re-validated here so a
    /// definition mutated after construction cannot smuggle in a cycle.
    pub fn create_workflow(
        &self,
        definition: WorkflowDefinition,
    ) -> OrchestrationResult<WorkflowId> {
        definition.revalidate()?;
        let workflow_id = definition.id;
        info!(
            workflow_id = %workflow_id,
            name = %definition.name,
            steps = definition.steps.len(),
            "DIRECTOR: Workflow registered"
        );
        self.definitions.insert(workflow_id, Arc::new(definition));
        Ok(workflow_id)
    }

    /// Look up a registered definition
    pub fn workflow(&self, workflow_id: WorkflowId) -> Option<Arc<WorkflowDefinition>> {
        self.definitions.get(&workflow_id).map(|d| Arc::clone(&d))
    }

    /// Start executing a registered workflow; returns the execution id
    pub async fn execute(&self, workflow_id: WorkflowId) -> OrchestrationResult<ExecutionId> {
        let definition = self
            .definitions
            .get(&workflow_id)
            .map(|d| Arc::clone(&d))
            .ok_or(OrchestrationError::WorkflowNotFound(workflow_id))?;
        let execution = WorkflowExecution::for_definition(&definition);
        Ok(self.spawn_execution(definition, execution))
    }

    fn spawn_execution(
        &self,
        definition: Arc<WorkflowDefinition>,
        execution: WorkflowExecution,
    ) -> ExecutionId {
        let execution_id = execution.id;
        let initial_control = if execution.status == WorkflowState::Paused {
            ControlState::Paused
        } else {
            ControlState::Running
        };
        let (control, _) = watch::channel(initial_control);
        let (cancel, _) = watch::channel(false);

        let handle = Arc::new(ExecutionHandle {
            workflow_id: definition.id,
            state: Mutex::new(execution),
            control,
            cancel,
            task: parking_lot::Mutex::new(None),
        });
        self.executions.insert(execution_id, Arc::clone(&handle));

        let executor = Arc::new(StepExecutor::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.registry),
            self.config.scheduler.cancel_grace_period,
        ));
        let exec_loop = ExecutionLoop {
            definition,
            handle: Arc::clone(&handle),
            executor,
            checkpoints: Arc::clone(&self.checkpoints),
            events: self.events.clone(),
            config: self.config.scheduler.clone(),
            executions: Arc::clone(&self.executions),
            history: Arc::clone(&self.history),
            counters: Arc::clone(&self.counters),
            backoff: BackoffCalculator::new(
                self.config.scheduler.retry_backoff_base,
                self.config.scheduler.retry_backoff_max,
            ),
        };
        let task = tokio::spawn(exec_loop.run());
        *handle.task.lock() = Some(task);
        execution_id
    }

    /// Stop admitting new steps; in-flight steps are allowed to finish
    pub async fn pause(&self, execution_id: ExecutionId) -> OrchestrationResult<()> {
        let handle = self.active_handle(execution_id)?;
        if *handle.control.borrow() == ControlState::Cancelling {
            return Err(OrchestrationError::ExecutionCancelled(execution_id));
        }
        let status = handle.state.lock().await.status;
        if status != WorkflowState::Running {
            return Err(OrchestrationError::InvalidExecutionState {
                execution_id,
                status,
                operation: "pause",
            });
        }
        handle.control.send_replace(ControlState::Paused);
        Ok(())
    }

    /// Re-enter the scheduling loop from Paused
    pub async fn resume(&self, execution_id: ExecutionId) -> OrchestrationResult<()> {
        let handle = self.active_handle(execution_id)?;
        if *handle.control.borrow() == ControlState::Cancelling {
            return Err(OrchestrationError::ExecutionCancelled(execution_id));
        }
        let status = handle.state.lock().await.status;
        if status != WorkflowState::Paused {
            return Err(OrchestrationError::InvalidExecutionState {
                execution_id,
                status,
                operation: "resume",
            });
        }
        handle.control.send_replace(ControlState::Running);
        Ok(())
    }

    /// Cancel an execution. Terminal and irreversible: in-flight steps get
    /// the configured grace period, Pending steps are skipped.
    pub async fn cancel(&self, execution_id: ExecutionId) -> OrchestrationResult<()> {
        let handle = self.active_handle(execution_id)?;
        handle.control.send_replace(ControlState::Cancelling);
        Ok(())
    }

    /// Status of a live, historical, or checkpointed execution
    pub async fn status(
        &self,
        execution_id: ExecutionId,
    ) -> OrchestrationResult<ExecutionStatusView> {
        if let Some(handle) = self.executions.get(&execution_id).map(|h| Arc::clone(&h)) {
            let definition = self
                .definitions
                .get(&handle.workflow_id)
                .map(|d| Arc::clone(&d));
            let execution = handle.state.lock().await;
            let name = definition.map(|d| d.name.clone()).unwrap_or_default();
            return Ok(build_view(&name, &execution));
        }

        if let Some(view) = self
            .history
            .lock()
            .iter()
            .find(|v| v.execution_id == execution_id)
            .cloned()
        {
            return Ok(view);
        }

        // after a restart the only record may be the checkpoint store
        if let Some(checkpoint) = self.checkpoints.load_latest(execution_id).await? {
            return Ok(build_view(
                &checkpoint.definition.name,
                &checkpoint.execution,
            ));
        }

        Err(OrchestrationError::ExecutionNotFound(execution_id))
    }

    /// Resume a non-terminal execution from its latest checkpoint. Steps that
    /// were in flight at snapshot time are requeued with their attempt counts
    /// preserved; succeeded steps are never re-executed.
    pub async fn recover(&self, execution_id: ExecutionId) -> OrchestrationResult<ExecutionId> {
        if let Some(handle) = self.executions.get(&execution_id).map(|h| Arc::clone(&h)) {
            let status = handle.state.lock().await.status;
            return Err(OrchestrationError::InvalidExecutionState {
                execution_id,
                status,
                operation: "recover (already live)",
            });
        }

        let checkpoint = self
            .checkpoints
            .load_latest(execution_id)
            .await?
            .ok_or(OrchestrationError::CheckpointNotFound(execution_id))?;

        if checkpoint.execution.status.is_terminal() {
            return Err(OrchestrationError::InvalidExecutionState {
                execution_id,
                status: checkpoint.execution.status,
                operation: "recover",
            });
        }

        let definition = self
            .definitions
            .entry(checkpoint.definition.id)
            .or_insert_with(|| Arc::new(checkpoint.definition.clone()))
            .clone();
        let execution = checkpoint.restore();

        info!(
            execution_id = %execution_id,
            sequence = checkpoint.sequence,
            "🔁 DIRECTOR: Recovering execution from checkpoint"
        );
        self.events.publish(
            events::WORKFLOW_RECOVERED,
            json!({
                "execution_id": execution_id.to_string(),
                "sequence": checkpoint.sequence,
            }),
        );
        Ok(self.spawn_execution(definition, execution))
    }

    /// Recover every non-terminal execution known to the checkpoint store.
    /// Returns the ids that were brought back.
    pub async fn recover_all(&self) -> OrchestrationResult<Vec<ExecutionId>> {
        let mut recovered = Vec::new();
        for execution_id in self.checkpoints.list_executions().await? {
            match self.recover(execution_id).await {
                Ok(id) => recovered.push(id),
                Err(
                    OrchestrationError::InvalidExecutionState { .. }
                    | OrchestrationError::CheckpointNotFound(_),
                ) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(recovered)
    }

    /// Per-pool-key session statistics
    pub async fn pool_stats(&self) -> PoolStats {
        self.pool.stats().await
    }

    /// System-wide execution counters
    pub async fn system_metrics(&self) -> SystemMetrics {
        let mut running = 0usize;
        let mut paused = 0usize;
        let handles: Vec<Arc<ExecutionHandle>> =
            self.executions.iter().map(|e| e.value().clone()).collect();
        for handle in &handles {
            match handle.state.lock().await.status {
                WorkflowState::Running => running += 1,
                WorkflowState::Paused => paused += 1,
                _ => {}
            }
        }

        let counters = self.counters.lock();
        let finished = counters.completed + counters.failed;
        SystemMetrics {
            workflows_defined: self.definitions.len(),
            active_executions: handles.len(),
            running_executions: running,
            paused_executions: paused,
            completed_executions: counters.completed,
            failed_executions: counters.failed,
            cancelled_executions: counters.cancelled,
            success_rate: if finished == 0 {
                0.0
            } else {
                counters.completed as f64 / finished as f64
            },
        }
    }

    /// Cancel live executions, stop the health sweep, and close every session
    pub async fn shutdown(&self) {
        info!("🛑 DIRECTOR: Shutting down");
        let handles: Vec<Arc<ExecutionHandle>> =
            self.executions.iter().map(|e| e.value().clone()).collect();
        for handle in &handles {
            handle.control.send_replace(ControlState::Cancelling);
        }
        for handle in handles {
            let task = handle.task.lock().take();
            if let Some(task) = task {
                let _ = task.await;
            }
        }

        let monitor = self.health_monitor.lock().take();
        if let Some(monitor) = monitor {
            monitor.shutdown().await;
        }
        self.pool.shutdown().await;
        info!("✅ DIRECTOR: Shutdown complete");
    }

    fn active_handle(&self, execution_id: ExecutionId) -> OrchestrationResult<Arc<ExecutionHandle>> {
        self.executions
            .get(&execution_id)
            .map(|h| Arc::clone(&h))
            .ok_or(OrchestrationError::ExecutionNotFound(execution_id))
    }
}

/// One scheduler loop driving one execution to a terminal state
struct ExecutionLoop {
    definition: Arc<WorkflowDefinition>,
    handle: Arc<ExecutionHandle>,
    executor: Arc<StepExecutor>,
    checkpoints: Arc<dyn CheckpointStore>,
    events: EventPublisher,
    config: SchedulerConfig,
    executions: Arc<DashMap<ExecutionId, Arc<ExecutionHandle>>>,
    history: Arc<parking_lot::Mutex<VecDeque<ExecutionStatusView>>>,
    counters: Arc<parking_lot::Mutex<Counters>>,
    backoff: BackoffCalculator,
}

impl ExecutionLoop {
    async fn run(self) {
        let execution_id;
        {
            let mut execution = self.handle.state.lock().await;
            execution_id = execution.id;
            if execution.status == WorkflowState::Pending {
                self.apply_workflow_event(&mut execution, &WorkflowEvent::Start);
                execution.started_at = Some(Utc::now());
                self.checkpoint(&mut execution).await;
                info!(
                    execution_id = %execution_id,
                    workflow = %self.definition.name,
                    "🚀 DIRECTOR: Execution started"
                );
                self.events.publish(
                    events::WORKFLOW_STARTED,
                    json!({
                        "execution_id": execution_id.to_string(),
                        "workflow_id": self.definition.id.to_string(),
                    }),
                );
            }
        }

        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<StepOutcome>();
        let mut control_rx = self.handle.control.subscribe();
        let deadline = tokio::time::Instant::now() + self.definition.global_timeout;
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let final_status = loop {
            if *control_rx.borrow() == ControlState::Cancelling {
                break self.drain_and_cancel(&mut outcome_rx, "execution cancelled").await;
            }

            {
                let mut execution = self.handle.state.lock().await;
                let control = *control_rx.borrow();
                match (execution.status, control) {
                    (WorkflowState::Running, ControlState::Paused) => {
                        self.apply_workflow_event(&mut execution, &WorkflowEvent::Pause);
                        self.checkpoint(&mut execution).await;
                        info!(execution_id = %execution_id, "⏸️ DIRECTOR: Execution paused");
                        self.events.publish(
                            events::WORKFLOW_PAUSED,
                            json!({"execution_id": execution_id.to_string()}),
                        );
                    }
                    (WorkflowState::Paused, ControlState::Running) => {
                        self.apply_workflow_event(&mut execution, &WorkflowEvent::Resume);
                        self.checkpoint(&mut execution).await;
                        info!(execution_id = %execution_id, "▶️ DIRECTOR: Execution resumed");
                        self.events.publish(
                            events::WORKFLOW_RESUMED,
                            json!({"execution_id": execution_id.to_string()}),
                        );
                    }
                    _ => {}
                }

                // upstream failure propagation
                for step_id in readiness::unsatisfiable_steps(&self.definition, &execution) {
                    self.skip_step(&mut execution, &step_id, "upstream step failed or skipped")
                        .await;
                }

                if execution.all_steps_terminal() {
                    break self.finish(&mut execution).await;
                }

                if execution.status == WorkflowState::Running {
                    let capacity = self
                        .definition
                        .max_concurrent_steps
                        .saturating_sub(execution.running_count());
                    if capacity > 0 {
                        let now = Utc::now();
                        let admitted: Vec<WorkflowStep> =
                            readiness::ready_steps(&self.definition, &execution, now)
                                .into_iter()
                                .take(capacity)
                                .cloned()
                                .collect();
                        for step in admitted {
                            self.admit_step(&mut execution, step, &outcome_tx).await;
                        }
                    }
                }
            }

            tokio::select! {
                Some(outcome) = outcome_rx.recv() => {
                    let mut execution = self.handle.state.lock().await;
                    self.apply_outcome(&mut execution, outcome).await;
                    while let Ok(outcome) = outcome_rx.try_recv() {
                        self.apply_outcome(&mut execution, outcome).await;
                    }
                }
                _ = ticker.tick() => {}
                _ = control_rx.changed() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(
                        execution_id = %execution_id,
                        timeout_secs = self.definition.global_timeout.as_secs(),
                        "⏰ DIRECTOR: Global timeout exceeded"
                    );
                    break self.drain_and_fail_timeout(&mut outcome_rx).await;
                }
            }
        };

        self.finalize(execution_id, final_status).await;
    }

    /// Admit one ready step: transition to Running, bump the attempt count,
    /// checkpoint, and spawn the attempt task.
    async fn admit_step(
        &self,
        execution: &mut WorkflowExecution,
        step: WorkflowStep,
        outcome_tx: &mpsc::UnboundedSender<StepOutcome>,
    ) {
        let now = Utc::now();
        let prior_outputs: HashMap<StepId, Value> = step
            .dependencies
            .iter()
            .filter_map(|dep| {
                execution
                    .step(dep)
                    .and_then(|r| r.output.clone())
                    .map(|output| (dep.clone(), output))
            })
            .collect();

        let attempt = {
            let Some(record) = execution.step_mut(&step.id) else {
                return;
            };
            match step_transition(record.status, &StepEvent::Start) {
                Ok(next) => record.status = next,
                Err(e) => {
                    error!(step_id = %step.id, error = %e, "DIRECTOR: Admission rejected");
                    return;
                }
            }
            record.attempts += 1;
            record.started_at.get_or_insert(now);
            record.next_retry_at = None;
            record.attempts
        };
        execution.touch();

        debug!(
            execution_id = %execution.id,
            step_id = %step.id,
            attempt,
            "DIRECTOR: Step admitted"
        );
        self.events.publish(
            events::STEP_STARTED,
            json!({
                "execution_id": execution.id.to_string(),
                "step_id": step.id,
                "attempt": attempt,
            }),
        );
        self.checkpoint(execution).await;

        let request = StepAttemptRequest {
            execution_id: execution.id,
            timeout: self
                .definition
                .timeout_for(&step, self.config.default_step_timeout),
            step,
            attempt,
            prior_outputs,
        };
        let executor = Arc::clone(&self.executor);
        let cancel_rx = self.handle.cancel.subscribe();
        let outcome_tx = outcome_tx.clone();
        tokio::spawn(async move {
            let outcome = executor.run_attempt(request, cancel_rx).await;
            // the loop may already be finishing; a dropped outcome is fine then
            let _ = outcome_tx.send(outcome);
        });
    }

    /// Fold one step attempt outcome into the execution record
    async fn apply_outcome(&self, execution: &mut WorkflowExecution, outcome: StepOutcome) {
        let step_id = outcome.step_id.clone();
        let Some(def_step) = self.definition.step(&step_id) else {
            warn!(step_id = %step_id, "DIRECTOR: Outcome for unknown step");
            return;
        };
        let max_retries = self.definition.max_retries_for(def_step);
        let optional = def_step.optional;

        let current = execution.step(&step_id).map(|r| r.status);
        if current != Some(StepState::Running) {
            warn!(step_id = %step_id, ?current, "DIRECTOR: Outcome for non-running step");
            return;
        }

        let now = Utc::now();
        match outcome.result {
            StepAttemptResult::Succeeded(output) => {
                if let Some(record) = execution.step_mut(&step_id) {
                    if let Ok(next) =
                        step_transition(record.status, &StepEvent::Succeed(output.clone()))
                    {
                        record.status = next;
                    }
                    record.output = Some(output);
                    record.finished_at = Some(now);
                    record.session_id = outcome.session;
                    record.last_error = None;
                }
                info!(
                    execution_id = %execution.id,
                    step_id = %step_id,
                    duration_ms = outcome.duration.as_millis() as u64,
                    "✅ DIRECTOR: Step succeeded"
                );
                self.events.publish(
                    events::STEP_COMPLETED,
                    json!({
                        "execution_id": execution.id.to_string(),
                        "step_id": step_id,
                    }),
                );
            }
            StepAttemptResult::SessionUnavailable(reason) => {
                // not a failure: the attempt never started, so give the
                // attempt count back and retry on the next tick
                if let Some(record) = execution.step_mut(&step_id) {
                    if let Ok(next) = step_transition(record.status, &StepEvent::Requeue) {
                        record.status = next;
                    }
                    record.attempts = record.attempts.saturating_sub(1);
                    record.session_id = None;
                }
                debug!(
                    execution_id = %execution.id,
                    step_id = %step_id,
                    reason = %reason,
                    "DIRECTOR: Step requeued awaiting a session"
                );
            }
            StepAttemptResult::Failed(error) => {
                let attempts = execution.step(&step_id).map(|r| r.attempts).unwrap_or(0);
                if attempts <= max_retries {
                    let delay = self.backoff.delay_for(attempts.saturating_sub(1));
                    if let Some(record) = execution.step_mut(&step_id) {
                        if let Ok(next) = step_transition(record.status, &StepEvent::Requeue) {
                            record.status = next;
                        }
                        record.last_error = Some(error.clone());
                        record.session_id = None;
                        record.next_retry_at = Some(
                            now + chrono::Duration::from_std(delay)
                                .unwrap_or_else(|_| chrono::Duration::seconds(1)),
                        );
                    }
                    warn!(
                        execution_id = %execution.id,
                        step_id = %step_id,
                        attempt = attempts,
                        max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "🔁 DIRECTOR: Step failed, retrying with backoff"
                    );
                    self.events.publish(
                        events::STEP_RETRYING,
                        json!({
                            "execution_id": execution.id.to_string(),
                            "step_id": step_id,
                            "attempt": attempts,
                        }),
                    );
                } else if optional {
                    if let Some(record) = execution.step_mut(&step_id) {
                        if let Ok(next) = step_transition(
                            record.status,
                            &StepEvent::Skip("retries exhausted".to_string()),
                        ) {
                            record.status = next;
                        }
                        record.last_error = Some(error.clone());
                        record.finished_at = Some(now);
                        record.session_id = None;
                    }
                    warn!(
                        execution_id = %execution.id,
                        step_id = %step_id,
                        error = %error,
                        "DIRECTOR: Optional step exhausted retries, skipping"
                    );
                    self.events.publish(
                        events::STEP_SKIPPED,
                        json!({
                            "execution_id": execution.id.to_string(),
                            "step_id": step_id,
                            "reason": "optional step exhausted retries",
                        }),
                    );
                } else {
                    if let Some(record) = execution.step_mut(&step_id) {
                        if let Ok(next) =
                            step_transition(record.status, &StepEvent::Fail(error.clone()))
                        {
                            record.status = next;
                        }
                        record.last_error = Some(error.clone());
                        record.finished_at = Some(now);
                        record.session_id = None;
                    }
                    if execution.first_failure.is_none() {
                        execution.first_failure = Some(FailureSummary {
                            step_id: step_id.clone(),
                            error: error.clone(),
                        });
                    }
                    error!(
                        execution_id = %execution.id,
                        step_id = %step_id,
                        attempts,
                        error = %error,
                        "❌ DIRECTOR: Step failed permanently"
                    );
                    self.events.publish(
                        events::STEP_FAILED,
                        json!({
                            "execution_id": execution.id.to_string(),
                            "step_id": step_id,
                            "error": error,
                        }),
                    );
                }
            }
            StepAttemptResult::Abandoned => {
                if let Some(record) = execution.step_mut(&step_id) {
                    if let Ok(next) = step_transition(
                        record.status,
                        &StepEvent::Skip("abandoned during cancellation".to_string()),
                    ) {
                        record.status = next;
                    }
                    record.last_error = Some("abandoned during cancellation".to_string());
                    record.finished_at = Some(now);
                    record.session_id = None;
                }
                self.events.publish(
                    events::STEP_SKIPPED,
                    json!({
                        "execution_id": execution.id.to_string(),
                        "step_id": step_id,
                        "reason": "abandoned during cancellation",
                    }),
                );
            }
        }
        self.checkpoint(execution).await;
    }

    /// Mark one Pending step Skipped
    async fn skip_step(&self, execution: &mut WorkflowExecution, step_id: &str, reason: &str) {
        let Some(record) = execution.step_mut(step_id) else {
            return;
        };
        match step_transition(record.status, &StepEvent::Skip(reason.to_string())) {
            Ok(next) => {
                record.status = next;
                record.finished_at = Some(Utc::now());
                record.last_error = Some(reason.to_string());
            }
            Err(e) => {
                error!(step_id = %step_id, error = %e, "DIRECTOR: Skip rejected");
                return;
            }
        }
        info!(
            execution_id = %execution.id,
            step_id = %step_id,
            reason = %reason,
            "⏭️ DIRECTOR: Step skipped"
        );
        self.events.publish(
            events::STEP_SKIPPED,
            json!({
                "execution_id": execution.id.to_string(),
                "step_id": step_id,
                "reason": reason,
            }),
        );
        self.checkpoint(execution).await;
    }

    /// Every step is terminal: settle the execution
    async fn finish(&self, execution: &mut WorkflowExecution) -> WorkflowState {
        // completion can land while paused; step back into Running first
        if execution.status == WorkflowState::Paused {
            self.apply_workflow_event(execution, &WorkflowEvent::Resume);
        }

        if execution.any_step_failed() {
            let error = execution
                .first_failure
                .as_ref()
                .map(|f| f.error.clone())
                .unwrap_or_else(|| "step failed".to_string());
            self.apply_workflow_event(execution, &WorkflowEvent::Fail(error));
        } else {
            self.apply_workflow_event(execution, &WorkflowEvent::Complete);
        }
        execution.finished_at = Some(Utc::now());
        self.checkpoint(execution).await;

        match execution.status {
            WorkflowState::Completed => {
                info!(execution_id = %execution.id, "🎉 DIRECTOR: Execution completed");
                self.events.publish(
                    events::WORKFLOW_COMPLETED,
                    json!({"execution_id": execution.id.to_string()}),
                );
            }
            WorkflowState::Failed => {
                error!(
                    execution_id = %execution.id,
                    first_failure = ?execution.first_failure,
                    "❌ DIRECTOR: Execution failed"
                );
                self.events.publish(
                    events::WORKFLOW_FAILED,
                    json!({
                        "execution_id": execution.id.to_string(),
                        "first_failure": execution
                            .first_failure
                            .as_ref()
                            .map(|f| f.step_id.clone()),
                    }),
                );
            }
            _ => {}
        }
        execution.status
    }

    /// Cancellation path: let in-flight steps finish within the grace period,
    /// then skip everything still pending and settle as Cancelled.
    async fn drain_and_cancel(
        &self,
        outcome_rx: &mut mpsc::UnboundedReceiver<StepOutcome>,
        reason: &str,
    ) -> WorkflowState {
        self.handle.cancel.send_replace(true);

        loop {
            let running = self.handle.state.lock().await.running_count();
            if running == 0 {
                break;
            }
            match outcome_rx.recv().await {
                Some(outcome) => {
                    let mut execution = self.handle.state.lock().await;
                    self.apply_outcome(&mut execution, outcome).await;
                }
                None => break,
            }
        }

        let mut execution = self.handle.state.lock().await;
        let pending: Vec<StepId> = execution
            .steps
            .values()
            .filter(|r| r.status == StepState::Pending)
            .map(|r| r.step_id.clone())
            .collect();
        for step_id in pending {
            self.skip_step(&mut execution, &step_id, reason).await;
        }

        self.apply_workflow_event(&mut execution, &WorkflowEvent::Cancel);
        execution.finished_at = Some(Utc::now());
        self.checkpoint(&mut execution).await;
        info!(execution_id = %execution.id, "🚫 DIRECTOR: Execution cancelled");
        self.events.publish(
            events::WORKFLOW_CANCELLED,
            json!({"execution_id": execution.id.to_string()}),
        );
        execution.status
    }

    /// Global timeout path: cancel in-flight work, then settle as Failed
    async fn drain_and_fail_timeout(
        &self,
        outcome_rx: &mut mpsc::UnboundedReceiver<StepOutcome>,
    ) -> WorkflowState {
        self.handle.cancel.send_replace(true);

        loop {
            let running = self.handle.state.lock().await.running_count();
            if running == 0 {
                break;
            }
            match outcome_rx.recv().await {
                Some(outcome) => {
                    let mut execution = self.handle.state.lock().await;
                    self.apply_outcome(&mut execution, outcome).await;
                }
                None => break,
            }
        }

        let mut execution = self.handle.state.lock().await;
        let timeout_msg = format!(
            "global timeout of {}s exceeded",
            self.definition.global_timeout.as_secs()
        );
        let pending: Vec<StepId> = execution
            .steps
            .values()
            .filter(|r| r.status == StepState::Pending)
            .map(|r| r.step_id.clone())
            .collect();
        if execution.first_failure.is_none() {
            let blamed = pending
                .first()
                .cloned()
                .unwrap_or_else(|| "(none)".to_string());
            execution.first_failure = Some(FailureSummary {
                step_id: blamed,
                error: timeout_msg.clone(),
            });
        }
        for step_id in pending {
            self.skip_step(&mut execution, &step_id, &timeout_msg).await;
        }

        if execution.status == WorkflowState::Paused {
            self.apply_workflow_event(&mut execution, &WorkflowEvent::Resume);
        }
        self.apply_workflow_event(&mut execution, &WorkflowEvent::Fail(timeout_msg));
        execution.finished_at = Some(Utc::now());
        self.checkpoint(&mut execution).await;
        self.events.publish(
            events::WORKFLOW_FAILED,
            json!({
                "execution_id": execution.id.to_string(),
                "reason": "global timeout",
            }),
        );
        execution.status
    }

    /// Move the finished execution into bounded history and drop the handle
    async fn finalize(&self, execution_id: ExecutionId, final_status: WorkflowState) {
        let view = {
            let execution = self.handle.state.lock().await;
            build_view(&self.definition.name, &execution)
        };
        {
            let mut history = self.history.lock();
            history.push_back(view);
            while history.len() > self.config.history_limit {
                history.pop_front();
            }
        }
        {
            let mut counters = self.counters.lock();
            match final_status {
                WorkflowState::Completed => counters.completed += 1,
                WorkflowState::Failed => counters.failed += 1,
                WorkflowState::Cancelled => counters.cancelled += 1,
                _ => {}
            }
        }
        self.executions.remove(&execution_id);
    }

    fn apply_workflow_event(&self, execution: &mut WorkflowExecution, event: &WorkflowEvent) {
        match workflow_transition(execution.status, event) {
            Ok(next) => {
                execution.status = next;
                execution.touch();
            }
            Err(e) => {
                error!(
                    execution_id = %execution.id,
                    error = %e,
                    "DIRECTOR: Workflow transition rejected"
                );
            }
        }
    }

    /// Bump the sequence number and persist a full snapshot. A failed write
    /// is logged and the execution keeps going; durability degrades to the
    /// last successful checkpoint.
    async fn checkpoint(&self, execution: &mut WorkflowExecution) {
        execution.checkpoint_seq += 1;
        execution.touch();
        let checkpoint = ExecutionCheckpoint::capture(&self.definition, execution);
        if let Err(e) = self.checkpoints.save(&checkpoint).await {
            error!(
                execution_id = %execution.id,
                sequence = checkpoint.sequence,
                error = %e,
                "❌ DIRECTOR: Checkpoint write failed"
            );
        } else {
            self.events.publish(
                events::CHECKPOINT_CREATED,
                json!({
                    "execution_id": execution.id.to_string(),
                    "sequence": checkpoint.sequence,
                }),
            );
        }
    }
}

fn build_view(workflow_name: &str, execution: &WorkflowExecution) -> ExecutionStatusView {
    ExecutionStatusView {
        execution_id: execution.id,
        workflow_id: execution.workflow_id,
        workflow_name: workflow_name.to_string(),
        status: execution.status,
        progress: execution.progress(),
        steps: execution
            .steps
            .iter()
            .map(|(id, record)| {
                (
                    id.clone(),
                    StepStatusView {
                        status: record.status,
                        attempts: record.attempts,
                        started_at: record.started_at,
                        finished_at: record.finished_at,
                        last_error: record.last_error.clone(),
                    },
                )
            })
            .collect(),
        first_failure: execution.first_failure.clone(),
        created_at: execution.created_at,
        updated_at: execution.updated_at,
    }
}
