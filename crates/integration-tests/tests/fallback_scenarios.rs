//! Fallback Orchestrator Integration Tests
//!
//! Black-box checks of tier routing, attempt accounting and the emergency path

use async_trait::async_trait;
use resilience_core::application::FallbackOrchestrator;
use resilience_core::domain::{
    ContextData, FallbackConfig, FallbackLevel, FallbackResult, FallbackStrategy, OperationType,
    ServiceError, ServiceLevelMapping, ServiceType,
};
use resilience_core::port::time_provider::ManualTimeProvider;
use resilience_core::port::{EmergencyHandler, InMemoryHealthProvider};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct PlaceholderHandler;

#[async_trait]
impl EmergencyHandler for PlaceholderHandler {
    fn cache_key(&self, _op: OperationType, _context: &ContextData) -> Option<String> {
        None
    }

    async fn handle(&self, _op: OperationType, _context: &ContextData) -> Option<Value> {
        Some(json!({"emergency_mode": true}))
    }
}

fn setup() -> (FallbackOrchestrator, Arc<InMemoryHealthProvider>) {
    let health = Arc::new(InMemoryHealthProvider::new());
    let orchestrator =
        FallbackOrchestrator::new(health.clone(), Arc::new(ManualTimeProvider::new(1_000)));
    (orchestrator, health)
}

fn three_tiers() -> ServiceLevelMapping {
    ServiceLevelMapping::new(vec![ServiceType::Redis])
        .with_secondary(vec![ServiceType::InMemoryCache])
        .with_tertiary(vec![ServiceType::Database])
}

/// P1: a succeeding Primary wins with exactly one attempt
#[tokio::test]
async fn test_primary_success_is_single_attempt() {
    for strategy in [
        FallbackStrategy::GracefulDegradation,
        FallbackStrategy::PerformanceFirst,
        FallbackStrategy::ReliabilityFirst,
        FallbackStrategy::FailFast,
    ] {
        let (orchestrator, _health) = setup();
        orchestrator
            .register_operation_config(
                OperationType::CacheRead,
                FallbackConfig::with_strategy(strategy),
                three_tiers(),
            )
            .await
            .unwrap();

        let result = orchestrator
            .execute_with_fallback(
                OperationType::CacheRead,
                |service, _ctx| async move { Ok::<_, ServiceError>(service.to_string()) },
                None,
                None,
            )
            .await;

        assert!(result.success, "{:?} should succeed", strategy);
        assert_eq!(result.level_used, Some(FallbackLevel::Primary));
        assert_eq!(result.service_used, Some(ServiceType::Redis));
        assert_eq!(result.attempts.len(), 1);
        assert!(!result.fallback_active);
    }
}

/// P2: every tier failing ends at the emergency handler
#[tokio::test]
async fn test_exhaustion_reaches_emergency_handler() {
    let (orchestrator, health) = setup();
    health.set_available(ServiceType::Database, false).await;
    orchestrator
        .register_operation_config(
            OperationType::CacheRead,
            FallbackConfig::default(),
            three_tiers().with_emergency_handler(Arc::new(PlaceholderHandler)),
        )
        .await
        .unwrap();

    let result: FallbackResult<Value> = orchestrator
        .execute_with_fallback(
            OperationType::CacheRead,
            |_service, _ctx| async { Err(ServiceError::operation("down")) },
            None,
            None,
        )
        .await;

    assert!(result.success);
    assert_eq!(result.level_used, Some(FallbackLevel::Emergency));
    assert!(result.fallback_active);
    assert_eq!(result.value.unwrap()["emergency_mode"], json!(true));
}

/// P2: without a handler exhaustion is a failure
#[tokio::test]
async fn test_exhaustion_without_handler_fails() {
    let (orchestrator, _health) = setup();
    orchestrator
        .register_operation_config(
            OperationType::CacheRead,
            FallbackConfig::default(),
            three_tiers(),
        )
        .await
        .unwrap();

    let result: FallbackResult<Value> = orchestrator
        .execute_with_fallback(
            OperationType::CacheRead,
            |_service, _ctx| async { Err(ServiceError::operation("down")) },
            None,
            None,
        )
        .await;

    assert!(!result.success);
    assert!(result.level_used.is_none());
    assert!(result.error_message.is_some());
    assert_eq!(result.attempts.len(), 3);
}

/// P3: attempts equal the number of services actually invoked
#[tokio::test]
async fn test_attempts_match_invocations() {
    let (orchestrator, health) = setup();
    health.set_available(ServiceType::InMemoryCache, false).await;
    orchestrator
        .register_operation_config(
            OperationType::CacheRead,
            FallbackConfig::default(),
            ServiceLevelMapping::new(vec![ServiceType::Redis, ServiceType::ExternalApi])
                .with_secondary(vec![ServiceType::InMemoryCache])
                .with_tertiary(vec![ServiceType::Database]),
        )
        .await
        .unwrap();

    let invoked = AtomicUsize::new(0);
    let result = orchestrator
        .execute_with_fallback(
            OperationType::CacheRead,
            |service, _ctx| {
                invoked.fetch_add(1, Ordering::SeqCst);
                async move {
                    if service == ServiceType::Database {
                        Ok(1u32)
                    } else {
                        Err(ServiceError::operation("miss"))
                    }
                }
            },
            None,
            None,
        )
        .await;

    assert!(result.success);
    assert_eq!(result.level_used, Some(FallbackLevel::Tertiary));
    assert_eq!(invoked.load(Ordering::SeqCst), 3);
    assert_eq!(result.attempts.len(), invoked.load(Ordering::SeqCst));
    assert!(result
        .attempts
        .iter()
        .all(|a| a.service != Some(ServiceType::InMemoryCache)));
}

/// Scenario A: unavailable primary is skipped, secondary serves
#[tokio::test]
async fn test_graceful_degradation_to_secondary() {
    let (orchestrator, health) = setup();
    health.set_available(ServiceType::Redis, false).await;
    orchestrator
        .register_operation_config(
            OperationType::SessionRead,
            FallbackConfig::with_strategy(FallbackStrategy::GracefulDegradation),
            ServiceLevelMapping::new(vec![ServiceType::Redis])
                .with_secondary(vec![ServiceType::Database]),
        )
        .await
        .unwrap();

    let result = orchestrator
        .execute_with_fallback(
            OperationType::SessionRead,
            |service, _ctx| async move {
                assert_eq!(service, ServiceType::Database);
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, ServiceError>(json!({"session_id": "s-1", "user_id": "u-1"}))
            },
            None,
            None,
        )
        .await;

    assert!(result.success);
    assert_eq!(result.level_used, Some(FallbackLevel::Secondary));
    assert_eq!(result.service_used, Some(ServiceType::Database));
    assert!(result.fallback_active);
    assert_eq!(result.attempts.len(), 1);
    assert!(result.attempts[0].success);
    assert!(result.total_time_ms >= 5.0);
}

/// Scenario B: fail fast never reaches the secondary tier
#[tokio::test]
async fn test_fail_fast_records_single_failure() {
    let (orchestrator, _health) = setup();
    orchestrator
        .register_operation_config(
            OperationType::DatabaseQuery,
            FallbackConfig::with_strategy(FallbackStrategy::FailFast),
            ServiceLevelMapping::new(vec![ServiceType::Database])
                .with_secondary(vec![ServiceType::InMemoryCache]),
        )
        .await
        .unwrap();

    let result: FallbackResult<Value> = orchestrator
        .execute_with_fallback(
            OperationType::DatabaseQuery,
            |_service, _ctx| async { Err(ServiceError::operation("query failed")) },
            None,
            None,
        )
        .await;

    assert!(!result.success);
    assert!(result.level_used.is_none());
    assert_eq!(result.attempts.len(), 1);
    assert_eq!(result.attempts[0].service, Some(ServiceType::Database));
    assert!(!result.attempts[0].success);
}

/// Built-in session placeholder is served and cached until shutdown
#[tokio::test]
async fn test_session_emergency_placeholder_and_shutdown() {
    let (orchestrator, _health) = setup();
    let mut ctx = ContextData::new();
    ctx.insert("session_id".to_string(), json!("s-42"));

    let result: FallbackResult<Value> = orchestrator
        .execute_with_fallback(
            OperationType::SessionRead,
            |_service, _ctx| async { Err(ServiceError::operation("redis down")) },
            Some(ctx),
            Some(FallbackConfig::with_strategy(FallbackStrategy::EmergencyOnly)),
        )
        .await;

    assert!(result.success);
    assert_eq!(result.level_used, Some(FallbackLevel::Emergency));
    assert_eq!(result.value.unwrap()["emergency_mode"], json!(true));

    let status = orchestrator.get_fallback_status().await;
    assert_eq!(status.emergency_cache_size, 1);
    assert_eq!(orchestrator.shutdown().await, 1);
}
