//! # Action Registry
//!
//! Name-keyed lookup of step action implementations, built at startup.
//! The orchestrator resolves a step's `action` string here and invokes the
//! implementation through the common [`StepAction`] contract; everything an
//! action does behind that contract (navigation, extraction, form filling,
//! submission) is an external concern.

use crate::models::execution::ExecutionId;
use crate::models::workflow::StepId;
use crate::pool::context::ContextStore;
use crate::pool::session_pool::SessionRef;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Everything an action may see for one step attempt
#[derive(Clone)]
pub struct StepActionContext {
    pub execution_id: ExecutionId,
    pub step_id: StepId,
    pub parameters: Value,
    /// The session acquired for this step, when the step declares one
    pub session: Option<SessionRef>,
    /// Outputs of the step's satisfied dependencies, keyed by step id
    pub prior_outputs: HashMap<StepId, Value>,
    /// Session-scoped context store shared with the pool
    pub context: Arc<ContextStore>,
}

/// Failures surfaced by action execution
#[derive(Debug, Clone, thiserror::Error)]
pub enum StepActionError {
    #[error("action failed: {0}")]
    Failed(String),
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("action '{0}' is not registered")]
    UnknownAction(String),
}

/// Common execution contract for every step behavior
#[async_trait]
pub trait StepAction: Send + Sync {
    async fn execute(&self, ctx: StepActionContext) -> Result<Value, StepActionError>;
}

/// Registry of action implementations keyed by name
#[derive(Default)]
pub struct ActionRegistry {
    actions: RwLock<HashMap<String, Arc<dyn StepAction>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action implementation under `name`, replacing any previous
    /// registration for the same name
    pub async fn register(&self, name: impl Into<String>, action: Arc<dyn StepAction>) {
        let name = name.into();
        let mut actions = self.actions.write().await;
        if actions.insert(name.clone(), action).is_some() {
            warn!(action = %name, "REGISTRY: Action re-registered, replacing previous");
        } else {
            debug!(action = %name, "REGISTRY: Action registered");
        }
    }

    /// Resolve an action implementation by name
    pub async fn resolve(&self, name: &str) -> Option<Arc<dyn StepAction>> {
        self.actions.read().await.get(name).cloned()
    }

    /// Resolve and invoke an action. An unregistered name is a step failure
    /// subject to the step's retry policy, not a panic.
    pub async fn execute(
        &self,
        name: &str,
        ctx: StepActionContext,
    ) -> Result<Value, StepActionError> {
        let action = self
            .resolve(name)
            .await
            .ok_or_else(|| StepActionError::UnknownAction(name.to_string()))?;
        action.execute(ctx).await
    }

    /// Names of every registered action
    pub async fn action_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.actions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.actions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoAction;

    #[async_trait]
    impl StepAction for EchoAction {
        async fn execute(&self, ctx: StepActionContext) -> Result<Value, StepActionError> {
            Ok(json!({"echo": ctx.parameters}))
        }
    }

    fn context(parameters: Value) -> StepActionContext {
        StepActionContext {
            execution_id: ExecutionId::new(),
            step_id: "step".to_string(),
            parameters,
            session: None,
            prior_outputs: HashMap::new(),
            context: Arc::new(ContextStore::new()),
        }
    }

    #[tokio::test]
    async fn registered_action_executes() {
        let registry = ActionRegistry::new();
        registry.register("echo", Arc::new(EchoAction)).await;

        let output = registry
            .execute("echo", context(json!({"q": "rust"})))
            .await
            .unwrap();
        assert_eq!(output, json!({"echo": {"q": "rust"}}));
    }

    #[tokio::test]
    async fn unknown_action_is_an_error_not_a_panic() {
        let registry = ActionRegistry::new();
        let err = registry
            .execute("missing", context(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, StepActionError::UnknownAction(name) if name == "missing"));
    }

    #[tokio::test]
    async fn names_are_sorted() {
        let registry = ActionRegistry::new();
        registry.register("submit", Arc::new(EchoAction)).await;
        registry.register("extract", Arc::new(EchoAction)).await;
        assert_eq!(registry.action_names().await, vec!["extract", "submit"]);
    }
}
