// Recovery Task port
// Typed replacement for untyped callables handed to the recovery system

use crate::domain::{RecoveryResult, ServiceError, ServiceType};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Work re-executed by the recovery system
///
/// Arguments are captured by the implementor. The returned JSON value is what
/// the consistency check inspects.
#[async_trait]
pub trait RecoveryTask: Send + Sync {
    async fn execute(&self) -> Result<serde_json::Value, ServiceError>;
}

/// Invoked with the terminal result of a recovery operation
pub type RecoveryCallback = Arc<dyn Fn(&RecoveryResult) + Send + Sync>;

/// Invoked when a service transitions from unavailable to available
pub type ServiceRecoveryCallback = Arc<dyn Fn(ServiceType) + Send + Sync>;

/// Adapter turning an async closure into a `RecoveryTask`
pub struct FnRecoveryTask<F> {
    f: F,
}

impl<F> FnRecoveryTask<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> RecoveryTask for FnRecoveryTask<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, ServiceError>> + Send + 'static,
{
    async fn execute(&self) -> Result<serde_json::Value, ServiceError> {
        (self.f)().await
    }
}
