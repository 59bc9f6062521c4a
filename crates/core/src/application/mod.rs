// Application Layer - Fallback orchestration and error recovery services

pub mod fallback;
pub mod recovery;
pub mod shutdown;

// Re-exports
pub use fallback::{FallbackOrchestrator, FallbackStatus};
pub use recovery::{ErrorRecoverySystem, RecoveryRequest, RecoveryStatus, SyncRequest};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
