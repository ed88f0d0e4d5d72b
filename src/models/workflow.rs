//! Declarative workflow definitions: an immutable DAG of steps with
//! dependencies, retry policy, and resource requirements.
//!
//! A definition is validated when it is built; a graph with duplicate ids,
//! dangling dependency references, or a cycle is a construction-time error,
//! never a runtime condition.

use crate::models::session::PoolKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Identifier of a step, unique within its definition
pub type StepId = String;

/// Opaque identifier of a registered workflow definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(Uuid);

impl WorkflowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Priority of a whole workflow, used by status consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for WorkflowPriority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Admission priority of a step among mutually-ready siblings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for ExecutionPriority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Resource a step needs before its action can be invoked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "pool_key", rename_all = "snake_case")]
pub enum StepResource {
    /// The action runs without a session
    None,
    /// The action needs a session from the named pool key
    Session(PoolKey),
}

impl Default for StepResource {
    fn default() -> Self {
        Self::None
    }
}

/// One step of a workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: StepId,
    pub name: String,
    /// Action registry key invoked for this step
    pub action: String,
    pub parameters: Value,
    pub dependencies: Vec<StepId>,
    /// Per-step action timeout override
    pub timeout: Option<Duration>,
    /// Per-step retry budget override
    pub max_retries: Option<u32>,
    pub resource: StepResource,
    pub priority: ExecutionPriority,
    /// An optional step that is skipped still satisfies its dependents, and
    /// exhausting its retries skips it instead of failing the execution
    pub optional: bool,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, action: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            action: action.into(),
            parameters: Value::Object(serde_json::Map::new()),
            dependencies: Vec::new(),
            timeout: None,
            max_retries: None,
            resource: StepResource::None,
            priority: ExecutionPriority::Normal,
            optional: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<impl Into<String>>) -> Self {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_session(mut self, pool_key: impl Into<PoolKey>) -> Self {
        self.resource = StepResource::Session(pool_key.into());
        self
    }

    pub fn with_priority(mut self, priority: ExecutionPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Validation failures raised while building a definition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("duplicate step id '{0}'")]
    DuplicateStepId(StepId),
    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: StepId, dependency: StepId },
    #[error("dependency cycle involving step '{0}'")]
    DependencyCycle(StepId),
}

/// Immutable, validated workflow definition
///
/// ```
/// use director_core::models::workflow::{WorkflowDefinition, WorkflowStep};
///
/// let definition = WorkflowDefinition::new(
///     "job_discovery",
///     "Search and merge job postings",
///     vec![
///         WorkflowStep::new("search", "search_jobs").with_session("job_discovery"),
///         WorkflowStep::new("merge", "merge_results").with_dependencies(vec!["search"]),
///     ],
/// )
/// .unwrap();
/// assert_eq!(definition.steps.len(), 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub name: String,
    pub description: String,
    pub steps: Vec<WorkflowStep>,
    /// Whole-execution deadline; expiry fails the execution
    pub global_timeout: Duration,
    pub max_concurrent_steps: usize,
    pub priority: WorkflowPriority,
    /// Retry budget for steps without their own override
    pub default_max_retries: u32,
}

impl WorkflowDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        steps: Vec<WorkflowStep>,
    ) -> Result<Self, DefinitionError> {
        Self::validate(&steps)?;
        Ok(Self {
            id: WorkflowId::new(),
            name: name.into(),
            description: description.into(),
            steps,
            global_timeout: Duration::from_secs(
                crate::constants::system::DEFAULT_WORKFLOW_TIMEOUT_SECS,
            ),
            max_concurrent_steps: crate::constants::system::DEFAULT_MAX_CONCURRENT_STEPS,
            priority: WorkflowPriority::Normal,
            default_max_retries: crate::constants::system::DEFAULT_MAX_RETRIES,
        })
    }

    pub fn with_global_timeout(mut self, timeout: Duration) -> Self {
        self.global_timeout = timeout;
        self
    }

    pub fn with_max_concurrent_steps(mut self, max: usize) -> Self {
        self.max_concurrent_steps = max.max(1);
        self
    }

    pub fn with_priority(mut self, priority: WorkflowPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    /// Re-run graph validation; used when registering a definition whose
    /// public fields may have been touched since construction
    pub fn revalidate(&self) -> Result<(), DefinitionError> {
        Self::validate(&self.steps)
    }

    /// Look up a step by id
    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Effective retry budget for a step
    pub fn max_retries_for(&self, step: &WorkflowStep) -> u32 {
        step.max_retries.unwrap_or(self.default_max_retries)
    }

    /// Effective action timeout for a step
    pub fn timeout_for(&self, step: &WorkflowStep, default: Duration) -> Duration {
        step.timeout.unwrap_or(default)
    }

    fn validate(steps: &[WorkflowStep]) -> Result<(), DefinitionError> {
        let mut ids = HashSet::new();
        for step in steps {
            if !ids.insert(step.id.as_str()) {
                return Err(DefinitionError::DuplicateStepId(step.id.clone()));
            }
        }

        for step in steps {
            for dep in &step.dependencies {
                if !ids.contains(dep.as_str()) {
                    return Err(DefinitionError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        // Kahn's algorithm; any node left with in-degree > 0 sits on a cycle.
        // Duplicate dependency entries count once, matching the single
        // decrement per resolved dependency below.
        let mut in_degree: HashMap<&str, usize> = steps
            .iter()
            .map(|s| {
                let unique: HashSet<&str> = s.dependencies.iter().map(String::as_str).collect();
                (s.id.as_str(), unique.len())
            })
            .collect();
        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0usize;

        while let Some(id) = queue.pop_front() {
            visited += 1;
            for step in steps {
                if step.dependencies.iter().any(|d| d == id) {
                    let degree = in_degree
                        .get_mut(step.id.as_str())
                        .expect("step id present in in-degree map");
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(step.id.as_str());
                    }
                }
            }
        }

        if visited != steps.len() {
            let on_cycle = in_degree
                .iter()
                .find(|(_, d)| **d > 0)
                .map(|(id, _)| (*id).to_string())
                .unwrap_or_default();
            return Err(DefinitionError::DependencyCycle(on_cycle));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, deps: &[&str]) -> WorkflowStep {
        WorkflowStep::new(id, "noop").with_dependencies(deps.to_vec())
    }

    #[test]
    fn accepts_a_diamond() {
        let def = WorkflowDefinition::new(
            "diamond",
            "",
            vec![
                step("a", &[]),
                step("b", &["a"]),
                step("c", &["a"]),
                step("d", &["b", "c"]),
            ],
        );
        assert!(def.is_ok());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = WorkflowDefinition::new("dup", "", vec![step("a", &[]), step("a", &[])])
            .unwrap_err();
        assert_eq!(err, DefinitionError::DuplicateStepId("a".to_string()));
    }

    #[test]
    fn rejects_unknown_dependency() {
        let err = WorkflowDefinition::new("dangling", "", vec![step("a", &["ghost"])])
            .unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownDependency { .. }));
    }

    #[test]
    fn rejects_cycles() {
        let err = WorkflowDefinition::new(
            "cycle",
            "",
            vec![step("a", &["c"]), step("b", &["a"]), step("c", &["b"])],
        )
        .unwrap_err();
        assert!(matches!(err, DefinitionError::DependencyCycle(_)));
    }

    #[test]
    fn retry_and_timeout_overrides_resolve() {
        let def = WorkflowDefinition::new(
            "overrides",
            "",
            vec![
                WorkflowStep::new("a", "noop").with_max_retries(7),
                WorkflowStep::new("b", "noop"),
            ],
        )
        .unwrap()
        .with_default_max_retries(2);

        let a = def.step("a").unwrap();
        let b = def.step("b").unwrap();
        assert_eq!(def.max_retries_for(a), 7);
        assert_eq!(def.max_retries_for(b), 2);
        assert_eq!(
            def.timeout_for(b, Duration::from_secs(9)),
            Duration::from_secs(9)
        );
    }
}
