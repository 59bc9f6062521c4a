// Port Layer - Interfaces for external collaborators

pub mod emergency_handler;
pub mod health_provider;
pub mod id_provider; // For deterministic testing
pub mod recovery_task;
pub mod sync_executor;
pub mod time_provider;

// Re-exports
pub use emergency_handler::EmergencyHandler;
pub use health_provider::{
    InMemoryHealthProvider, OverallHealth, ServiceHealthProvider, ServiceMetrics, SystemHealth,
};
pub use id_provider::IdProvider;
pub use recovery_task::{FnRecoveryTask, RecoveryCallback, RecoveryTask, ServiceRecoveryCallback};
pub use sync_executor::SyncExecutor;
pub use time_provider::TimeProvider;
