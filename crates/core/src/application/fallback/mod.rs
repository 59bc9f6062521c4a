//! Fallback Orchestrator
//!
//! Per-call routing across service tiers. For each call the orchestrator:
//! 1. Resolves the config (override, registered, or default) and mapping
//! 2. Asks the strategy manager for an ordered level sequence
//! 3. Hands each non-skipped level to the level executor, stopping at the first success
//! 4. Falls back to the emergency handler when every level fails
//!
//! Failures never escape as errors; they are reported in the `FallbackResult`.

pub mod emergency;
pub mod level_executor;
pub mod strategy;

pub use emergency::{EmergencyHandlerRegistry, DEFAULT_EMERGENCY_TTL};
pub use level_executor::{LevelExecutor, LevelOutcome};
pub use strategy::FallbackStrategyManager;

use crate::domain::{
    ContextData, FallbackAttempt, FallbackConfig, FallbackLevel, FallbackResult,
    FallbackStrategy, OperationType, ServiceError, ServiceLevelMapping, ServiceType,
};
use crate::error::{AppError, Result};
use crate::port::{ServiceHealthProvider, ServiceMetrics, SystemHealth, TimeProvider};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Per-level attempt counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LevelStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Snapshot returned by `get_fallback_status`
#[derive(Debug, Clone, Serialize)]
pub struct FallbackStatus {
    pub system_health: SystemHealth,
    pub operation_configs: BTreeMap<OperationType, FallbackConfig>,
    pub level_stats: BTreeMap<FallbackLevel, LevelStats>,
    pub service_performance: BTreeMap<ServiceType, ServiceMetrics>,
    pub emergency_cache_size: usize,
}

struct OperationRegistration {
    config: FallbackConfig,
    mapping: ServiceLevelMapping,
}

pub struct FallbackOrchestrator {
    health: Arc<dyn ServiceHealthProvider>,
    strategy_manager: FallbackStrategyManager,
    level_executor: LevelExecutor,
    emergency: Arc<EmergencyHandlerRegistry>,
    registrations: RwLock<HashMap<OperationType, OperationRegistration>>,
    level_stats: Mutex<HashMap<FallbackLevel, LevelStats>>,
}

impl FallbackOrchestrator {
    /// Create an orchestrator with the built-in emergency handlers
    pub fn new(health: Arc<dyn ServiceHealthProvider>, time_provider: Arc<dyn TimeProvider>) -> Self {
        let emergency = Arc::new(EmergencyHandlerRegistry::with_builtin_handlers(
            time_provider.clone(),
        ));
        Self::with_emergency_registry(health, time_provider, emergency)
    }

    pub fn with_emergency_registry(
        health: Arc<dyn ServiceHealthProvider>,
        time_provider: Arc<dyn TimeProvider>,
        emergency: Arc<EmergencyHandlerRegistry>,
    ) -> Self {
        Self {
            strategy_manager: FallbackStrategyManager::new(health.clone()),
            level_executor: LevelExecutor::new(health.clone(), time_provider),
            health,
            emergency,
            registrations: RwLock::new(HashMap::new()),
            level_stats: Mutex::new(HashMap::new()),
        }
    }

    pub fn emergency_registry(&self) -> &Arc<EmergencyHandlerRegistry> {
        &self.emergency
    }

    /// Register the policy and tier mapping for an operation type
    ///
    /// # Errors
    /// - AppError::Validation if the config is invalid
    /// - AppError::Config if the mapping has no services and no emergency handler
    pub async fn register_operation_config(
        &self,
        operation_type: OperationType,
        config: FallbackConfig,
        mapping: ServiceLevelMapping,
    ) -> Result<()> {
        config
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        if mapping.all_services().is_empty()
            && mapping.emergency_handler.is_none()
            && config.strategy != FallbackStrategy::EmergencyOnly
        {
            return Err(AppError::Config(format!(
                "mapping for {} has no services and no emergency handler",
                operation_type
            )));
        }

        if let Some(handler) = &mapping.emergency_handler {
            self.emergency.register(operation_type, handler.clone()).await;
        }

        info!(
            operation_type = %operation_type,
            strategy = ?config.strategy,
            primary = ?mapping.primary,
            secondary = ?mapping.secondary,
            tertiary = ?mapping.tertiary,
            "Registered fallback configuration"
        );

        self.registrations
            .write()
            .await
            .insert(operation_type, OperationRegistration { config, mapping });
        Ok(())
    }

    /// Execute `operation` against the tiers configured for `operation_type`
    ///
    /// `operation` receives the service to target and the shared context.
    /// Emergency placeholders are JSON and are deserialized into `T`.
    pub async fn execute_with_fallback<T, F, Fut>(
        &self,
        operation_type: OperationType,
        operation: F,
        context: Option<ContextData>,
        config_override: Option<FallbackConfig>,
    ) -> FallbackResult<T>
    where
        T: DeserializeOwned,
        F: Fn(ServiceType, Arc<ContextData>) -> Fut,
        Fut: Future<Output = std::result::Result<T, ServiceError>>,
    {
        let started = Instant::now();
        let context = Arc::new(context.unwrap_or_default());
        let (config, mapping) = self.resolve(operation_type, config_override).await;
        let mut result = FallbackResult::pending();
        let mut last_error = None;

        if config.strategy != FallbackStrategy::EmergencyOnly {
            let sequence = self
                .strategy_manager
                .determine_sequence(operation_type, &config, &mapping, Some(context.as_ref()))
                .await;

            for plan in sequence {
                if !plan.last_resort
                    && self
                        .strategy_manager
                        .should_skip_level(plan.level, &plan.services, &config)
                        .await
                {
                    continue;
                }

                let outcome = self
                    .level_executor
                    .execute_level(&plan, &operation, &config, &context)
                    .await;
                self.record_attempts(&outcome.attempts).await;
                result.attempts.extend(outcome.attempts);

                if let Some((service, value)) = outcome.winner {
                    result.win(plan.level, Some(service), value);
                    break;
                }
                if outcome.last_error.is_some() {
                    last_error = outcome.last_error;
                }
            }
        }

        if !result.success {
            if let Err(e) = self
                .execute_emergency(operation_type, &mapping, &config, &context, &mut result)
                .await
            {
                last_error = Some(e);
            }
        }

        if !result.success {
            let message = last_error.unwrap_or_else(|| {
                format!("All fallback levels exhausted for {}", operation_type)
            });
            warn!(
                operation_type = %operation_type,
                attempts = result.attempts.len(),
                error = %message,
                "Fallback execution failed"
            );
            result.error_message = Some(message);
        } else if result.fallback_active {
            info!(
                operation_type = %operation_type,
                level = ?result.level_used,
                service = ?result.service_used,
                "Operation served by fallback level"
            );
        }

        result.total_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        result
    }

    /// Best currently-usable service for `operation_type`
    ///
    /// The first level (Primary first) with an available, circuit-closed
    /// service wins; within it the highest success rate is chosen, ties going
    /// to the lowest response time.
    pub async fn get_optimal_service(&self, operation_type: OperationType) -> Option<ServiceType> {
        let mapping = {
            let registrations = self.registrations.read().await;
            registrations.get(&operation_type)?.mapping.clone()
        };

        for level in FallbackLevel::SERVICE_LEVELS {
            let mut best: Option<(ServiceType, ServiceMetrics)> = None;

            for service in mapping.services_for(level) {
                if !self.health.is_available(*service).await {
                    continue;
                }
                let metrics = self.health.metrics(*service).await;
                if metrics.circuit_breaker_open {
                    continue;
                }

                let better = match &best {
                    None => true,
                    Some((_, current)) => {
                        metrics.success_rate > current.success_rate
                            || (metrics.success_rate == current.success_rate
                                && metrics.response_time_ms < current.response_time_ms)
                    }
                };
                if better {
                    best = Some((*service, metrics));
                }
            }

            if let Some((service, _)) = best {
                return Some(service);
            }
        }

        None
    }

    pub async fn get_fallback_status(&self) -> FallbackStatus {
        let (operation_configs, services) = {
            let registrations = self.registrations.read().await;
            let configs: BTreeMap<_, _> = registrations
                .iter()
                .map(|(op, reg)| (*op, reg.config.clone()))
                .collect();
            let mut services: Vec<ServiceType> = registrations
                .values()
                .flat_map(|reg| reg.mapping.all_services())
                .collect();
            services.sort();
            services.dedup();
            (configs, services)
        };

        let mut service_performance = BTreeMap::new();
        for service in services {
            service_performance.insert(service, self.health.metrics(service).await);
        }

        let level_stats = self
            .level_stats
            .lock()
            .await
            .iter()
            .map(|(level, stats)| (*level, *stats))
            .collect();

        FallbackStatus {
            system_health: self.health.system_health().await,
            operation_configs,
            level_stats,
            service_performance,
            emergency_cache_size: self.emergency.cache_size().await,
        }
    }

    pub async fn level_stats(&self, level: FallbackLevel) -> LevelStats {
        self.level_stats
            .lock()
            .await
            .get(&level)
            .copied()
            .unwrap_or_default()
    }

    /// Release cached emergency data, returning how many entries were evicted
    pub async fn shutdown(&self) -> usize {
        let evicted = self.emergency.clear_cache().await;
        info!(evicted = evicted, "Fallback orchestrator shut down");
        evicted
    }

    async fn resolve(
        &self,
        operation_type: OperationType,
        config_override: Option<FallbackConfig>,
    ) -> (FallbackConfig, ServiceLevelMapping) {
        let registrations = self.registrations.read().await;
        let registered = registrations.get(&operation_type);

        let config = config_override
            .or_else(|| registered.map(|r| r.config.clone()))
            .unwrap_or_default();
        let mapping = registered.map(|r| r.mapping.clone()).unwrap_or_default();

        if registered.is_none() {
            debug!(operation_type = %operation_type, "No registered mapping, using defaults");
        }
        (config, mapping)
    }

    /// Runs the emergency handler, updating `result` on success
    ///
    /// Returns Err with a message when a handler ran but produced no usable value.
    async fn execute_emergency<T: DeserializeOwned>(
        &self,
        operation_type: OperationType,
        mapping: &ServiceLevelMapping,
        config: &FallbackConfig,
        context: &ContextData,
        result: &mut FallbackResult<T>,
    ) -> std::result::Result<(), String> {
        let handler = match &mapping.emergency_handler {
            Some(handler) => Some(handler.clone()),
            None => self.emergency.handler_for(operation_type).await,
        };
        let Some(handler) = handler else {
            debug!(operation_type = %operation_type, "No emergency handler registered");
            return Ok(());
        };

        let value = self
            .emergency
            .invoke_handler(
                handler.as_ref(),
                operation_type,
                context,
                Some(config.emergency_cache_ttl()),
            )
            .await;

        let outcome = match value {
            Some(value) => serde_json::from_value::<T>(value)
                .map_err(|e| format!("Emergency value has unexpected shape: {}", e)),
            None => Err(format!(
                "Emergency handler for {} produced no placeholder",
                operation_type
            )),
        };

        let succeeded = outcome.is_ok();
        self.record_level(FallbackLevel::Emergency, succeeded).await;

        match outcome {
            Ok(value) => {
                warn!(operation_type = %operation_type, "Serving emergency placeholder data");
                result.win(FallbackLevel::Emergency, None, value);
                Ok(())
            }
            Err(message) => Err(message),
        }
    }

    async fn record_attempts(&self, attempts: &[FallbackAttempt]) {
        let mut stats = self.level_stats.lock().await;
        for attempt in attempts {
            let entry = stats.entry(attempt.level).or_default();
            entry.attempts += 1;
            if attempt.success {
                entry.successes += 1;
            } else {
                entry.failures += 1;
            }
        }
    }

    async fn record_level(&self, level: FallbackLevel, success: bool) {
        let mut stats = self.level_stats.lock().await;
        let entry = stats.entry(level).or_default();
        entry.attempts += 1;
        if success {
            entry.successes += 1;
        } else {
            entry.failures += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::time_provider::ManualTimeProvider;
    use crate::port::{EmergencyHandler, InMemoryHealthProvider};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    fn orchestrator(health: Arc<InMemoryHealthProvider>) -> FallbackOrchestrator {
        FallbackOrchestrator::new(health, Arc::new(ManualTimeProvider::new(1_000)))
    }

    fn tiered_mapping() -> ServiceLevelMapping {
        ServiceLevelMapping::new(vec![ServiceType::Redis])
            .with_secondary(vec![ServiceType::InMemoryCache])
            .with_tertiary(vec![ServiceType::Database])
    }

    struct FixedHandler(Option<Value>);

    #[async_trait]
    impl EmergencyHandler for FixedHandler {
        fn cache_key(&self, _op: OperationType, _ctx: &ContextData) -> Option<String> {
            None
        }

        async fn handle(&self, _op: OperationType, _ctx: &ContextData) -> Option<Value> {
            self.0.clone()
        }
    }

    fn always_fail(
        _service: ServiceType,
        _ctx: Arc<ContextData>,
    ) -> std::future::Ready<std::result::Result<Value, ServiceError>> {
        std::future::ready(Err(ServiceError::operation("tier down")))
    }

    #[tokio::test]
    async fn test_primary_success_single_attempt() {
        let orch = orchestrator(Arc::new(InMemoryHealthProvider::new()));
        orch.register_operation_config(
            OperationType::CacheRead,
            FallbackConfig::default(),
            tiered_mapping(),
        )
        .await
        .unwrap();

        let result = orch
            .execute_with_fallback(
                OperationType::CacheRead,
                |service, _ctx| async move { Ok::<_, ServiceError>(service.to_string()) },
                None,
                None,
            )
            .await;

        assert!(result.success);
        assert_eq!(result.level_used, Some(FallbackLevel::Primary));
        assert_eq!(result.value.as_deref(), Some("redis"));
        assert_eq!(result.attempts.len(), 1);
        assert!(!result.fallback_active);
        assert_eq!(orch.level_stats(FallbackLevel::Primary).await.successes, 1);
    }

    #[tokio::test]
    async fn test_falls_through_to_secondary() {
        let orch = orchestrator(Arc::new(InMemoryHealthProvider::new()));
        orch.register_operation_config(
            OperationType::CacheRead,
            FallbackConfig::default(),
            tiered_mapping(),
        )
        .await
        .unwrap();

        let result = orch
            .execute_with_fallback(
                OperationType::CacheRead,
                |service, _ctx| async move {
                    match service {
                        ServiceType::Redis => Err(ServiceError::operation("redis down")),
                        _ => Ok(json!({"from": service})),
                    }
                },
                None,
                None,
            )
            .await;

        assert!(result.success);
        assert_eq!(result.level_used, Some(FallbackLevel::Secondary));
        assert_eq!(result.service_used, Some(ServiceType::InMemoryCache));
        assert!(result.fallback_active);
        assert_eq!(result.attempts.len(), 2);
        assert_eq!(orch.level_stats(FallbackLevel::Primary).await.failures, 1);
    }

    #[tokio::test]
    async fn test_emergency_handler_used_after_exhaustion() {
        let orch = orchestrator(Arc::new(InMemoryHealthProvider::new()));
        let mapping = tiered_mapping()
            .with_emergency_handler(Arc::new(FixedHandler(Some(json!({"emergency_mode": true})))));
        orch.register_operation_config(OperationType::CacheRead, FallbackConfig::default(), mapping)
            .await
            .unwrap();

        let result = orch
            .execute_with_fallback(OperationType::CacheRead, always_fail, None, None)
            .await;

        assert!(result.success);
        assert_eq!(result.level_used, Some(FallbackLevel::Emergency));
        assert!(result.fallback_active);
        assert_eq!(result.service_used, None);
        assert_eq!(result.attempts.len(), 3);
        assert_eq!(result.value.unwrap()["emergency_mode"], json!(true));
    }

    #[tokio::test]
    async fn test_handler_returning_none_is_failure() {
        let orch = orchestrator(Arc::new(InMemoryHealthProvider::new()));
        let mapping = tiered_mapping().with_emergency_handler(Arc::new(FixedHandler(None)));
        orch.register_operation_config(OperationType::CacheRead, FallbackConfig::default(), mapping)
            .await
            .unwrap();

        let result = orch
            .execute_with_fallback(OperationType::CacheRead, always_fail, None, None)
            .await;

        assert!(!result.success);
        assert_eq!(result.level_used, None);
        assert!(result.error_message.unwrap().contains("no placeholder"));
        assert_eq!(orch.level_stats(FallbackLevel::Emergency).await.failures, 1);
    }

    #[tokio::test]
    async fn test_emergency_only_skips_services() {
        let orch = orchestrator(Arc::new(InMemoryHealthProvider::new()));
        let mut ctx = ContextData::new();
        ctx.insert("session_id".to_string(), json!("s-9"));

        let result = orch
            .execute_with_fallback(
                OperationType::SessionRead,
                |_service, _ctx| async {
                    Err::<Value, _>(ServiceError::operation("services must not be called"))
                },
                Some(ctx),
                Some(FallbackConfig::with_strategy(FallbackStrategy::EmergencyOnly)),
            )
            .await;

        let value: Value = result.value.clone().unwrap();
        assert!(result.success);
        assert!(result.attempts.is_empty());
        assert_eq!(value["session_id"], json!("s-9"));
        assert_eq!(orch.emergency_registry().cache_size().await, 1);
    }

    #[tokio::test]
    async fn test_emergency_value_shape_mismatch_is_failure() {
        let orch = orchestrator(Arc::new(InMemoryHealthProvider::new()));
        let mapping = ServiceLevelMapping::new(vec![ServiceType::Redis])
            .with_emergency_handler(Arc::new(FixedHandler(Some(json!("not a number")))));
        orch.register_operation_config(OperationType::CacheRead, FallbackConfig::default(), mapping)
            .await
            .unwrap();

        let result: FallbackResult<u64> = orch
            .execute_with_fallback(
                OperationType::CacheRead,
                |_service, _ctx| async { Err(ServiceError::operation("down")) },
                None,
                None,
            )
            .await;

        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("unexpected shape"));
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_config() {
        let orch = orchestrator(Arc::new(InMemoryHealthProvider::new()));
        let config = FallbackConfig {
            timeout_per_level_ms: 0,
            ..Default::default()
        };
        let err = orch
            .register_operation_config(OperationType::CacheRead, config, tiered_mapping())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = orch
            .register_operation_config(
                OperationType::CacheRead,
                FallbackConfig::default(),
                ServiceLevelMapping::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    async fn test_optimal_service_prefers_reliable_available_primary() {
        let health = Arc::new(InMemoryHealthProvider::new());
        health
            .set_metrics(
                ServiceType::Redis,
                ServiceMetrics {
                    response_time_ms: 2.0,
                    success_rate: 90.0,
                    is_available: true,
                    circuit_breaker_open: false,
                },
            )
            .await;
        health.set_available(ServiceType::Database, false).await;
        let orch = orchestrator(health.clone());
        let mapping = ServiceLevelMapping::new(vec![
            ServiceType::Database,
            ServiceType::Redis,
            ServiceType::InMemoryCache,
        ]);
        orch.register_operation_config(OperationType::CacheRead, FallbackConfig::default(), mapping)
            .await
            .unwrap();

        assert_eq!(
            orch.get_optimal_service(OperationType::CacheRead).await,
            Some(ServiceType::InMemoryCache)
        );
        assert_eq!(orch.get_optimal_service(OperationType::ExternalCall).await, None);

        health.set_available(ServiceType::InMemoryCache, false).await;
        health.set_available(ServiceType::Redis, false).await;
        assert_eq!(orch.get_optimal_service(OperationType::CacheRead).await, None);
    }

    #[tokio::test]
    async fn test_status_reports_configs_and_performance() {
        let orch = orchestrator(Arc::new(InMemoryHealthProvider::new()));
        orch.register_operation_config(
            OperationType::CacheRead,
            FallbackConfig::default(),
            tiered_mapping(),
        )
        .await
        .unwrap();
        orch.execute_with_fallback(
            OperationType::CacheRead,
            |_s, _c| async { Ok::<_, ServiceError>(1u8) },
            None,
            None,
        )
        .await;

        let status = orch.get_fallback_status().await;
        assert!(status.operation_configs.contains_key(&OperationType::CacheRead));
        assert_eq!(status.service_performance.len(), 3);
        assert_eq!(status.level_stats[&FallbackLevel::Primary].attempts, 1);
        assert!(serde_json::to_value(&status).is_ok());
    }
}
