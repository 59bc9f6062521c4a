// Emergency Handler Registry
//
// Last-resort handlers per operation type plus a small TTL cache of the
// placeholder values they synthesize.

use crate::domain::{ContextData, OperationType};
use crate::port::{EmergencyHandler, TimeProvider};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Default lifetime of a cached emergency value (5 minutes)
pub const DEFAULT_EMERGENCY_TTL: Duration = Duration::from_secs(300);

struct CachedValue {
    value: Value,
    expires_at: Instant,
}

pub struct EmergencyHandlerRegistry {
    handlers: RwLock<HashMap<OperationType, Arc<dyn EmergencyHandler>>>,
    cache: Mutex<HashMap<String, CachedValue>>,
    default_ttl: Duration,
}

impl EmergencyHandlerRegistry {
    /// Empty registry
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Registry preloaded with the session and user-context placeholders
    pub fn with_builtin_handlers(time_provider: Arc<dyn TimeProvider>) -> Self {
        let session: Arc<dyn EmergencyHandler> =
            Arc::new(SessionEmergencyHandler::new(time_provider.clone()));
        let user_context: Arc<dyn EmergencyHandler> =
            Arc::new(UserContextEmergencyHandler::new(time_provider));

        let mut handlers = HashMap::new();
        handlers.insert(OperationType::SessionRead, session);
        handlers.insert(OperationType::UserContextRead, user_context);

        Self {
            handlers: RwLock::new(handlers),
            cache: Mutex::new(HashMap::new()),
            default_ttl: DEFAULT_EMERGENCY_TTL,
        }
    }

    pub async fn register(&self, operation_type: OperationType, handler: Arc<dyn EmergencyHandler>) {
        info!(operation_type = %operation_type, "Registered emergency handler");
        self.handlers.write().await.insert(operation_type, handler);
    }

    pub async fn handler_for(&self, operation_type: OperationType) -> Option<Arc<dyn EmergencyHandler>> {
        self.handlers.read().await.get(&operation_type).cloned()
    }

    /// Invoke the registered handler for `operation_type`
    pub async fn invoke(
        &self,
        operation_type: OperationType,
        context: &ContextData,
        ttl: Option<Duration>,
    ) -> Option<Value> {
        let handler = self.handler_for(operation_type).await?;
        self.invoke_handler(handler.as_ref(), operation_type, context, ttl)
            .await
    }

    /// Invoke `handler`, serving from and filling the TTL cache
    pub async fn invoke_handler(
        &self,
        handler: &dyn EmergencyHandler,
        operation_type: OperationType,
        context: &ContextData,
        ttl: Option<Duration>,
    ) -> Option<Value> {
        let key = handler.cache_key(operation_type, context);

        if let Some(key) = &key {
            let mut cache = self.cache.lock().await;
            match cache.get(key) {
                Some(cached) if cached.expires_at > Instant::now() => {
                    debug!(cache_key = %key, "Serving cached emergency value");
                    return Some(cached.value.clone());
                }
                Some(_) => {
                    cache.remove(key);
                }
                None => {}
            }
        }

        let value = handler.handle(operation_type, context).await;

        match (&key, &value) {
            (Some(key), Some(value)) => {
                let expires_at = Instant::now() + ttl.unwrap_or(self.default_ttl);
                self.cache.lock().await.insert(
                    key.clone(),
                    CachedValue {
                        value: value.clone(),
                        expires_at,
                    },
                );
            }
            (_, None) => {
                warn!(operation_type = %operation_type, "Emergency handler produced no placeholder");
            }
            _ => {}
        }

        value
    }

    /// Evict every cached value, returning how many were held
    pub async fn clear_cache(&self) -> usize {
        let mut cache = self.cache.lock().await;
        let count = cache.len();
        cache.clear();
        info!(evicted = count, "Emergency cache cleared");
        count
    }

    /// Number of unexpired cached values
    pub async fn cache_size(&self) -> usize {
        let now = Instant::now();
        let mut cache = self.cache.lock().await;
        cache.retain(|_, cached| cached.expires_at > now);
        cache.len()
    }
}

fn context_id(context: &ContextData, field: &str) -> Option<String> {
    match context.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Minimal session placeholder keyed by `session_id`
pub struct SessionEmergencyHandler {
    time_provider: Arc<dyn TimeProvider>,
}

impl SessionEmergencyHandler {
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self { time_provider }
    }
}

#[async_trait]
impl EmergencyHandler for SessionEmergencyHandler {
    fn cache_key(&self, _operation_type: OperationType, context: &ContextData) -> Option<String> {
        context_id(context, "session_id").map(|id| format!("emergency_session_{}", id))
    }

    async fn handle(&self, _operation_type: OperationType, context: &ContextData) -> Option<Value> {
        let session_id = context_id(context, "session_id")?;
        let user_id = context_id(context, "user_id");

        Some(json!({
            "session_id": session_id,
            "user_id": user_id,
            "is_active": true,
            "emergency_mode": true,
            "created_at": self.time_provider.now_millis(),
        }))
    }
}

/// Minimal user context with no permissions, keyed by `user_id`
pub struct UserContextEmergencyHandler {
    time_provider: Arc<dyn TimeProvider>,
}

impl UserContextEmergencyHandler {
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self { time_provider }
    }
}

#[async_trait]
impl EmergencyHandler for UserContextEmergencyHandler {
    fn cache_key(&self, _operation_type: OperationType, context: &ContextData) -> Option<String> {
        context_id(context, "user_id").map(|id| format!("emergency_user_context_{}", id))
    }

    async fn handle(&self, _operation_type: OperationType, context: &ContextData) -> Option<Value> {
        let user_id = context_id(context, "user_id")?;

        Some(json!({
            "user_id": user_id,
            "permissions": [],
            "preferences": {},
            "emergency_mode": true,
            "generated_at": self.time_provider.now_millis(),
        }))
    }
}
