use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events that can trigger workflow execution state transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WorkflowEvent {
    /// Begin scheduling steps
    Start,
    /// Suspend admission of new steps
    Pause,
    /// Re-enter the scheduling loop from Paused
    Resume,
    /// All steps reached a satisfying terminal state
    Complete,
    /// A required step failed permanently, with the error message
    Fail(String),
    /// Cancel the execution
    Cancel,
}

impl WorkflowEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::Cancel => "cancel",
        }
    }

    /// Extract the error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// Check if this event represents a terminal transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Fail(_) | Self::Cancel)
    }
}

/// Events that can trigger workflow step state transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StepEvent {
    /// An attempt was admitted and is in flight
    Start,
    /// The attempt completed, with the action output
    Succeed(Value),
    /// The attempt failed, with the error message
    Fail(String),
    /// Return the step to Pending for another attempt (retry backoff,
    /// session unavailability, or crash recovery of an in-flight step)
    Requeue,
    /// The step will never run, with the reason
    Skip(String),
}

impl StepEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Succeed(_) => "succeed",
            Self::Fail(_) => "fail",
            Self::Requeue => "requeue",
            Self::Skip(_) => "skip",
        }
    }

    /// Extract the error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }
}
