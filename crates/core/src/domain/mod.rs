// Domain Layer - Pure resilience vocabulary and entities

pub mod error;
pub mod fallback;
pub mod recovery;
pub mod service;
pub mod sync;

// Re-exports
pub use error::{DomainError, ServiceError};
pub use fallback::{
    FallbackAttempt, FallbackConfig, FallbackLevel, FallbackResult, FallbackStrategy,
    LevelPlan, ServiceLevelMapping,
};
pub use recovery::{
    DeadLetterItem, FailureCategory, FailureRecord, OperationId, RecoveryOperation,
    RecoveryPriority, RecoveryResult, RecoveryState, RecoveryType, RetryParams,
};
pub use service::{ContextData, OperationType, ServiceType};
pub use sync::{SyncItem, SyncJob, SyncJobId, SyncStatus, SyncType};
