// Emergency Handler port
use crate::domain::{ContextData, OperationType};
use async_trait::async_trait;

/// Last-resort producer of placeholder data
#[async_trait]
pub trait EmergencyHandler: Send + Sync {
    /// Cache key for the entity described by `context`
    ///
    /// None disables caching for this invocation.
    fn cache_key(&self, operation_type: OperationType, context: &ContextData) -> Option<String>;

    /// Synthesize a placeholder value
    ///
    /// Returning None signals that no safe placeholder exists.
    async fn handle(
        &self,
        operation_type: OperationType,
        context: &ContextData,
    ) -> Option<serde_json::Value>;
}
