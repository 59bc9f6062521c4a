// Operation & Service vocabulary
//
// Opaque to the core beyond equality and use as map keys.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Caller-supplied context (identity keys, request metadata)
///
/// Passed through to operations and emergency handlers untouched.
pub type ContextData = HashMap<String, serde_json::Value>;

/// What is being done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    SessionRead,
    SessionWrite,
    UserContextRead,
    UserContextWrite,
    CacheRead,
    CacheWrite,
    DatabaseQuery,
    ExternalCall,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::SessionRead => "session_read",
            OperationType::SessionWrite => "session_write",
            OperationType::UserContextRead => "user_context_read",
            OperationType::UserContextWrite => "user_context_write",
            OperationType::CacheRead => "cache_read",
            OperationType::CacheWrite => "cache_write",
            OperationType::DatabaseQuery => "database_query",
            OperationType::ExternalCall => "external_call",
        }
    }

    /// True for operations whose payload is session-shaped
    pub fn is_session(&self) -> bool {
        matches!(
            self,
            OperationType::SessionRead | OperationType::SessionWrite
        )
    }

    pub fn is_user_context(&self) -> bool {
        matches!(
            self,
            OperationType::UserContextRead | OperationType::UserContextWrite
        )
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which backing service handled an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Redis,
    InMemoryCache,
    Database,
    AuthService,
    ExternalApi,
}

impl ServiceType {
    /// Every service the health monitor watches
    pub const ALL: [ServiceType; 5] = [
        ServiceType::Redis,
        ServiceType::InMemoryCache,
        ServiceType::Database,
        ServiceType::AuthService,
        ServiceType::ExternalApi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Redis => "redis",
            ServiceType::InMemoryCache => "in_memory_cache",
            ServiceType::Database => "database",
            ServiceType::AuthService => "auth_service",
            ServiceType::ExternalApi => "external_api",
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
