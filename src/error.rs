use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum DirectorError {
    PoolError(String),
    ProvisioningError(String),
    StateTransitionError(String),
    OrchestrationError(String),
    RegistryError(String),
    CheckpointError(String),
    ValidationError(String),
    ConfigurationError(String),
}

impl fmt::Display for DirectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectorError::PoolError(msg) => write!(f, "Session pool error: {msg}"),
            DirectorError::ProvisioningError(msg) => write!(f, "Provisioning error: {msg}"),
            DirectorError::StateTransitionError(msg) => write!(f, "State transition error: {msg}"),
            DirectorError::OrchestrationError(msg) => write!(f, "Orchestration error: {msg}"),
            DirectorError::RegistryError(msg) => write!(f, "Registry error: {msg}"),
            DirectorError::CheckpointError(msg) => write!(f, "Checkpoint error: {msg}"),
            DirectorError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            DirectorError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for DirectorError {}

pub type Result<T> = std::result::Result<T, DirectorError>;
