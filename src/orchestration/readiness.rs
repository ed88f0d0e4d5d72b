//! # Step Readiness
//!
//! In-memory dependency analysis over a workflow DAG: which Pending steps
//! may run now (the ready set), and which can never run because an upstream
//! step failed or was skipped without being optional.
//!
//! Ordering guarantee: the ready set is sorted by declared step priority,
//! with definition order as the stable tie-break. Only admission order is
//! guaranteed, never wall-clock start order.

use crate::models::execution::WorkflowExecution;
use crate::models::workflow::{StepId, WorkflowDefinition, WorkflowStep};
use crate::state_machine::StepState;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Check whether every dependency of `step` is satisfied: Succeeded, or
/// Skipped while the dependency itself is marked optional.
pub fn dependencies_satisfied(
    definition: &WorkflowDefinition,
    execution: &WorkflowExecution,
    step: &WorkflowStep,
) -> bool {
    step.dependencies.iter().all(|dep_id| {
        let Some(record) = execution.step(dep_id) else {
            return false;
        };
        match record.status {
            StepState::Succeeded => true,
            StepState::Skipped => definition.step(dep_id).is_some_and(|d| d.optional),
            _ => false,
        }
    })
}

/// Compute the ready set: Pending steps whose dependencies are satisfied and
/// whose retry backoff has elapsed, ordered by priority then definition order.
pub fn ready_steps<'a>(
    definition: &'a WorkflowDefinition,
    execution: &WorkflowExecution,
    now: DateTime<Utc>,
) -> Vec<&'a WorkflowStep> {
    let mut ready: Vec<&WorkflowStep> = definition
        .steps
        .iter()
        .filter(|step| {
            execution.step(&step.id).is_some_and(|record| {
                record.status == StepState::Pending && record.backoff_elapsed(now)
            }) && dependencies_satisfied(definition, execution, step)
        })
        .collect();

    // stable sort keeps definition order among equal priorities
    ready.sort_by(|a, b| b.priority.cmp(&a.priority));
    ready
}

/// Pending steps that can never become ready: some dependency failed, or was
/// skipped without being optional, transitively. These are the steps the
/// scheduler marks Skipped.
pub fn unsatisfiable_steps(
    definition: &WorkflowDefinition,
    execution: &WorkflowExecution,
) -> Vec<StepId> {
    let mut doomed: HashSet<&str> = HashSet::new();

    loop {
        let mut changed = false;
        for step in &definition.steps {
            if doomed.contains(step.id.as_str()) {
                continue;
            }
            let is_pending = execution
                .step(&step.id)
                .is_some_and(|r| r.status == StepState::Pending);
            if !is_pending {
                continue;
            }

            let blocked = step.dependencies.iter().any(|dep_id| {
                let dep_optional = definition.step(dep_id).is_some_and(|d| d.optional);
                if doomed.contains(dep_id.as_str()) {
                    // an optional upstream that gets skipped still satisfies us
                    return !dep_optional;
                }
                match execution.step(dep_id).map(|r| r.status) {
                    Some(StepState::Failed) => true,
                    Some(StepState::Skipped) => !dep_optional,
                    _ => false,
                }
            });

            if blocked {
                doomed.insert(step.id.as_str());
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    definition
        .steps
        .iter()
        .filter(|s| doomed.contains(s.id.as_str()))
        .map(|s| s.id.clone())
        .collect()
}
