//! Runtime execution state of one workflow instantiation: per-step records,
//! timing, failure summary, and the checkpoint snapshot used for recovery.

use crate::models::session::SessionId;
use crate::models::workflow::{StepId, WorkflowDefinition, WorkflowId};
use crate::state_machine::{StepState, WorkflowState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Opaque identifier of a workflow execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ExecutionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The first permanently-failed step of an execution and its last error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSummary {
    pub step_id: StepId,
    pub error: String,
}

/// Mutable per-step execution record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub step_id: StepId,
    pub status: StepState,
    /// Attempts started so far; incremented when an attempt is admitted
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub output: Option<Value>,
    pub last_error: Option<String>,
    /// Earliest instant the next retry attempt may be admitted
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Session assigned to the in-flight attempt, if any
    pub session_id: Option<SessionId>,
}

impl StepExecution {
    fn new(step_id: StepId) -> Self {
        Self {
            step_id,
            status: StepState::Pending,
            attempts: 0,
            started_at: None,
            finished_at: None,
            output: None,
            last_error: None,
            next_retry_at: None,
            session_id: None,
        }
    }

    /// Check whether retry backoff still holds this step back
    pub fn backoff_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at.map_or(true, |at| now >= at)
    }
}

/// Mutable run-state of one workflow instantiation.
///
/// Mutated only by the owning scheduler loop; concurrent readers receive
/// snapshots through the status surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub status: WorkflowState,
    pub steps: BTreeMap<StepId, StepExecution>,
    /// Monotonically increasing checkpoint sequence number
    pub checkpoint_seq: u64,
    pub first_failure: Option<FailureSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    pub fn for_definition(definition: &WorkflowDefinition) -> Self {
        let now = Utc::now();
        Self {
            id: ExecutionId::new(),
            workflow_id: definition.id,
            status: WorkflowState::Pending,
            steps: definition
                .steps
                .iter()
                .map(|s| (s.id.clone(), StepExecution::new(s.id.clone())))
                .collect(),
            checkpoint_seq: 0,
            first_failure: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn step(&self, id: &str) -> Option<&StepExecution> {
        self.steps.get(id)
    }

    pub fn step_mut(&mut self, id: &str) -> Option<&mut StepExecution> {
        self.steps.get_mut(id)
    }

    /// Fraction of steps that reached a terminal state
    pub fn progress(&self) -> f64 {
        if self.steps.is_empty() {
            return 1.0;
        }
        let terminal = self
            .steps
            .values()
            .filter(|s| s.status.is_terminal())
            .count();
        terminal as f64 / self.steps.len() as f64
    }

    /// Number of steps currently in flight
    pub fn running_count(&self) -> usize {
        self.steps
            .values()
            .filter(|s| s.status == StepState::Running)
            .count()
    }

    /// Check whether every step reached a terminal state
    pub fn all_steps_terminal(&self) -> bool {
        self.steps.values().all(|s| s.status.is_terminal())
    }

    /// Check whether any step failed permanently
    pub fn any_step_failed(&self) -> bool {
        self.steps
            .values()
            .any(|s| s.status == StepState::Failed)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Durable snapshot of a workflow execution, written after every step-status
/// transition and tagged with a monotonically increasing sequence number.
///
/// The embedded definition makes a checkpoint self-contained: recovery after
/// a process restart does not depend on definitions having been re-registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionCheckpoint {
    pub sequence: u64,
    pub definition: WorkflowDefinition,
    pub execution: WorkflowExecution,
    pub created_at: DateTime<Utc>,
}

impl ExecutionCheckpoint {
    pub fn capture(definition: &WorkflowDefinition, execution: &WorkflowExecution) -> Self {
        Self {
            sequence: execution.checkpoint_seq,
            definition: definition.clone(),
            execution: execution.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution.id
    }

    /// Rebuild run-state for resumption: a step recorded Running at snapshot
    /// time becomes Pending with its attempt count preserved, so the retry is
    /// accounted rather than duplicated.
    pub fn restore(&self) -> WorkflowExecution {
        let mut execution = self.execution.clone();
        for step in execution.steps.values_mut() {
            if step.status == StepState::Running {
                step.status = StepState::Pending;
                step.session_id = None;
                step.next_retry_at = None;
            }
        }
        execution.touch();
        execution
    }
}
