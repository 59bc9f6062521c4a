// Simulated tiered-cache workload
//
// Redis is primary, the in-process cache secondary and the database tertiary.
// Redis goes through periodic outages so the daemon exercises fallback,
// recovery scheduling and the post-recovery incremental sync.

use async_trait::async_trait;
use rand::Rng;
use resilience_core::application::{
    ErrorRecoverySystem, FallbackOrchestrator, RecoveryRequest, ShutdownToken,
};
use resilience_core::domain::{
    ContextData, FallbackConfig, FallbackStrategy, OperationType, RecoveryPriority, RecoveryType,
    RetryParams, ServiceError, ServiceLevelMapping, ServiceType, SyncItem, SyncType,
};
use resilience_core::port::{FnRecoveryTask, InMemoryHealthProvider, SyncExecutor};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Ticks between Redis outages
const OUTAGE_EVERY_TICKS: u64 = 10;
/// Length of each outage in ticks
const OUTAGE_LENGTH_TICKS: u64 = 3;

fn cache_read_config() -> FallbackConfig {
    FallbackConfig::default()
}

/// Register the fallback policies the simulation uses
pub async fn register_policies(orchestrator: &FallbackOrchestrator) -> resilience_core::Result<()> {
    orchestrator
        .register_operation_config(
            OperationType::CacheRead,
            cache_read_config(),
            ServiceLevelMapping::new(vec![ServiceType::Redis])
                .with_secondary(vec![ServiceType::InMemoryCache])
                .with_tertiary(vec![ServiceType::Database]),
        )
        .await?;

    orchestrator
        .register_operation_config(
            OperationType::SessionRead,
            FallbackConfig::with_strategy(FallbackStrategy::FailFast),
            ServiceLevelMapping::new(vec![ServiceType::Redis]),
        )
        .await?;

    Ok(())
}

/// Sync executor that only logs reconciled batches
pub struct LoggingSyncExecutor;

#[async_trait]
impl SyncExecutor for LoggingSyncExecutor {
    async fn sync_batch(
        &self,
        service: ServiceType,
        sync_type: SyncType,
        items: &[SyncItem],
    ) -> Result<(), ServiceError> {
        info!(
            service = %service,
            sync_type = %sync_type,
            items = items.len(),
            "Reconciled sync batch"
        );
        Ok(())
    }
}

pub struct Simulation {
    orchestrator: Arc<FallbackOrchestrator>,
    recovery: Arc<ErrorRecoverySystem>,
    health: Arc<InMemoryHealthProvider>,
    interval: Duration,
    /// Budget for write-backs, taken from the cache read policy
    write_back_retry: RetryParams,
}

impl Simulation {
    pub fn new(
        orchestrator: Arc<FallbackOrchestrator>,
        recovery: Arc<ErrorRecoverySystem>,
        health: Arc<InMemoryHealthProvider>,
        interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            recovery,
            health,
            interval,
            write_back_retry: RetryParams::from(&cache_read_config()),
        }
    }

    pub async fn run(&self, mut shutdown: ShutdownToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "Simulation started");
        let mut tick: u64 = 0;

        loop {
            if shutdown.is_shutdown() {
                break;
            }

            tick += 1;
            self.update_outage(tick).await;
            self.cache_read(tick).await;
            self.session_read(tick).await;

            if shutdown.sleep_or_shutdown(self.interval).await {
                break;
            }
        }
        info!(ticks = tick, "Simulation stopped");
    }

    async fn update_outage(&self, tick: u64) {
        let down = tick % OUTAGE_EVERY_TICKS < OUTAGE_LENGTH_TICKS && tick > OUTAGE_LENGTH_TICKS;
        if tick % OUTAGE_EVERY_TICKS == 0 || tick % OUTAGE_EVERY_TICKS == OUTAGE_LENGTH_TICKS {
            info!(tick = tick, redis_available = !down, "Simulated Redis availability");
        }
        self.health.set_available(ServiceType::Redis, !down).await;
    }

    async fn cache_read(&self, tick: u64) {
        let key = format!("item:{}", tick % 5);
        let mut context = ContextData::new();
        context.insert("key".to_string(), json!(key));

        let result = self
            .orchestrator
            .execute_with_fallback(
                OperationType::CacheRead,
                |service, ctx| async move { simulated_lookup(service, &ctx).await },
                Some(context),
                None,
            )
            .await;

        if !result.success {
            warn!(key = %key, error = ?result.error_message, "Cache read failed on every tier");
            return;
        }

        debug!(
            key = %key,
            level = ?result.level_used,
            service = ?result.service_used,
            attempts = result.attempts.len(),
            "Cache read served"
        );

        // Served from a lower tier: write the value back to Redis later
        if result.fallback_active {
            let value = result.value.unwrap_or(Value::Null);
            let task = Arc::new(FnRecoveryTask::new(move || {
                let key = key.clone();
                let value = value.clone();
                async move { simulated_write(ServiceType::Redis, &key, value).await }
            }));
            self.recovery
                .schedule_recovery_operation(
                    RecoveryRequest::new(task, OperationType::CacheWrite, ServiceType::Redis)
                        .with_recovery_type(RecoveryType::DelayedRetry)
                        .with_priority(RecoveryPriority::Normal)
                        .with_retry_params(self.write_back_retry),
                )
                .await;
        }
    }

    async fn session_read(&self, tick: u64) {
        let mut context = ContextData::new();
        context.insert("session_id".to_string(), json!(format!("sess-{}", tick % 3)));
        context.insert("user_id".to_string(), json!("user-1"));

        let result = self
            .orchestrator
            .execute_with_fallback(
                OperationType::SessionRead,
                |service, ctx| async move { simulated_lookup(service, &ctx).await },
                Some(context),
                None,
            )
            .await;

        debug!(
            success = result.success,
            level = ?result.level_used,
            "Session read"
        );
    }
}

/// Wait for the simulation task, returning false if it did not stop cleanly
pub async fn await_stop(handle: JoinHandle<()>, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(error = %e, "Simulation task ended abnormally");
            false
        }
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "Simulation did not stop in time");
            false
        }
    }
}

/// Write against a pretend backend, echoing the stored value
async fn simulated_write(service: ServiceType, key: &str, value: Value) -> Result<Value, ServiceError> {
    if value.is_null() {
        return Err(ServiceError::InvalidData(format!("null value for {}", key)));
    }
    tokio::time::sleep(Duration::from_millis(2)).await;

    if rand::thread_rng().gen_bool(0.05) {
        return Err(ServiceError::operation(format!("{} write failed", service)));
    }
    debug!(service = %service, key = %key, "Value written back");
    Ok(value)
}

/// Lookup against a pretend backend with per-tier latency and flakiness
async fn simulated_lookup(service: ServiceType, ctx: &ContextData) -> Result<Value, ServiceError> {
    let (latency_ms, failure_rate) = match service {
        ServiceType::Redis => (2, 0.05),
        ServiceType::InMemoryCache => (1, 0.3),
        ServiceType::Database => (15, 0.01),
        _ => (50, 0.5),
    };
    tokio::time::sleep(Duration::from_millis(latency_ms)).await;

    let failed = rand::thread_rng().gen_bool(failure_rate);
    if failed {
        return Err(ServiceError::operation(format!("{} lookup failed", service)));
    }

    Ok(json!({
        "key": ctx.get("key").cloned().unwrap_or(Value::Null),
        "session_id": ctx.get("session_id").cloned().unwrap_or(Value::Null),
        "user_id": ctx.get("user_id").cloned().unwrap_or(Value::Null),
        "source": service.as_str(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_back_rejects_null_value() {
        let err = simulated_write(ServiceType::Redis, "item:1", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_await_stop_reports_unclean_exit() {
        assert!(await_stop(tokio::spawn(async {}), Duration::from_secs(1)).await);

        let panicked = tokio::spawn(async { panic!("simulation crashed") });
        assert!(!await_stop(panicked, Duration::from_secs(1)).await);

        let stuck = tokio::spawn(tokio::time::sleep(Duration::from_secs(60)));
        assert!(!await_stop(stuck, Duration::from_millis(10)).await);
    }

    #[test]
    fn test_write_back_budget_follows_cache_policy() {
        let params = RetryParams::from(&cache_read_config());
        assert_eq!(params.max_retry_attempts, cache_read_config().max_retry_attempts);
        tokio_test::assert_ok!(params.validate());
    }
}
