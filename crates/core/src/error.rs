// Central Error Type for the Resilience Layer

use thiserror::Error;

/// Application-level error type
///
/// Only configuration and registration paths return this. Operation failures
/// are reported inside `FallbackResult` / `RecoveryResult` instead.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
