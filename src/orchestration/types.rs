//! Shared types crossing orchestration component boundaries: step attempt
//! outcomes flowing back into the scheduler loop, and the views handed to
//! status consumers.

use crate::models::execution::{ExecutionId, FailureSummary};
use crate::models::workflow::{StepId, WorkflowId};
use crate::state_machine::{StepState, WorkflowState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Result of one step attempt, reported back to the scheduler loop
#[derive(Debug)]
pub enum StepAttemptResult {
    /// The action completed, with its output
    Succeeded(Value),
    /// The action returned an error or the attempt timed out
    Failed(String),
    /// A session could not be acquired; the step goes back to Pending
    /// without consuming an attempt
    SessionUnavailable(String),
    /// Cancellation grace expired mid-action; the step is abandoned
    Abandoned,
}

/// Envelope for a step attempt outcome
#[derive(Debug)]
pub struct StepOutcome {
    pub step_id: StepId,
    pub result: StepAttemptResult,
    /// Session the attempt ran against, when the step declared one
    pub session: Option<crate::models::session::SessionId>,
    pub duration: Duration,
}

/// Per-step view exposed through the status surface
#[derive(Debug, Clone, Serialize)]
pub struct StepStatusView {
    pub status: StepState,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Execution view exposed through the status surface
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStatusView {
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub workflow_name: String,
    pub status: WorkflowState,
    /// Fraction of steps in a terminal state, 0.0 ..= 1.0
    pub progress: f64,
    pub steps: BTreeMap<StepId, StepStatusView>,
    /// First unrecoverable step and its last error, when the execution failed
    pub first_failure: Option<FailureSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// System-wide counters for monitoring consumers
#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemMetrics {
    pub workflows_defined: usize,
    pub active_executions: usize,
    pub running_executions: usize,
    pub paused_executions: usize,
    pub completed_executions: u64,
    pub failed_executions: u64,
    pub cancelled_executions: u64,
    /// Completed / (completed + failed), 0.0 when nothing finished yet
    pub success_rate: f64,
}
