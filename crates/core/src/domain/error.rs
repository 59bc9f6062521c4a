// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid recovery state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;

/// Error returned by a wrapped service operation
///
/// Every operation handed to the orchestrator or the recovery system reports
/// failure through this type. The message is what ends up in attempt records
/// and failure history.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ServiceError {
    pub fn operation(msg: impl Into<String>) -> Self {
        ServiceError::Operation(msg.into())
    }

    /// True for the timeout marker recorded by level and recovery execution
    pub fn is_timeout(&self) -> bool {
        matches!(self, ServiceError::Timeout(_))
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Serialization(err.to_string())
    }
}
