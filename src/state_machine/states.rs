use serde::{Deserialize, Serialize};
use std::fmt;

/// Workflow execution state definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Initial state when an execution is created
    Pending,
    /// Execution is actively scheduling and running steps
    Running,
    /// Execution is suspended; in-flight steps finish, nothing new is admitted
    Paused,
    /// Every step reached Succeeded or optional-Skipped
    Completed,
    /// A required step exhausted its retries (or the global timeout elapsed)
    Failed,
    /// Execution was cancelled by the caller
    Cancelled,
}

impl WorkflowState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if this is an active state (scheduler loop is live)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for WorkflowState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid workflow state: {s}")),
        }
    }
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::Pending
    }
}

/// Workflow step state definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Initial state; also re-entered between retry attempts
    Pending,
    /// Step attempt is in flight (session acquired, action invoked)
    Running,
    /// Step action completed without error
    Succeeded,
    /// Step exhausted its retry budget
    Failed,
    /// Step will never run: upstream failure, cancellation, or optional exhaustion
    Skipped,
}

impl StepState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Check if this is an active state (an attempt is being processed)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Check if this step unconditionally satisfies dependents.
    ///
    /// Skipped is deliberately excluded; a skipped step only satisfies
    /// dependents when the step itself is marked optional, which the
    /// readiness pass evaluates against the definition.
    pub fn satisfies_dependencies(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::str::FromStr for StepState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("Invalid step state: {s}")),
        }
    }
}

impl Default for StepState {
    fn default() -> Self {
        Self::Pending
    }
}
