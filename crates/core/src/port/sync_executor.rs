// Sync Executor port
// Applies reconciliation items to a recovered service
use crate::domain::{ServiceError, ServiceType, SyncItem, SyncType};
use async_trait::async_trait;

#[async_trait]
pub trait SyncExecutor: Send + Sync {
    /// Reconcile one batch of items against `service`
    ///
    /// # Errors
    /// Any error fails the whole job; sync jobs are not retried.
    async fn sync_batch(
        &self,
        service: ServiceType,
        sync_type: SyncType,
        items: &[SyncItem],
    ) -> Result<(), ServiceError>;
}
