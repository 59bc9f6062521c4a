// Level Executor - tries each service of one fallback level in order

use crate::domain::{
    ContextData, FallbackAttempt, FallbackConfig, LevelPlan, ServiceError, ServiceType,
};
use crate::port::{ServiceHealthProvider, TimeProvider};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Outcome of one level: every attempt made, plus the winner if any
#[derive(Debug)]
pub struct LevelOutcome<T> {
    pub attempts: Vec<FallbackAttempt>,
    pub winner: Option<(ServiceType, T)>,
    pub last_error: Option<String>,
}

impl<T> LevelOutcome<T> {
    pub fn succeeded(&self) -> bool {
        self.winner.is_some()
    }
}

pub struct LevelExecutor {
    health: Arc<dyn ServiceHealthProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl LevelExecutor {
    pub fn new(health: Arc<dyn ServiceHealthProvider>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            health,
            time_provider,
        }
    }

    /// Try the level's services in list order, stopping at the first success
    ///
    /// Each invocation runs under `config.timeout_per_level`. A timed-out
    /// future is dropped, which cancels it at its next suspension point; any
    /// work already handed to the backing service is not rolled back.
    pub async fn execute_level<T, F, Fut>(
        &self,
        plan: &LevelPlan,
        operation: &F,
        config: &FallbackConfig,
        context: &Arc<ContextData>,
    ) -> LevelOutcome<T>
    where
        F: Fn(ServiceType, Arc<ContextData>) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let timeout = config.timeout_per_level();
        let mut outcome = LevelOutcome {
            attempts: Vec::new(),
            winner: None,
            last_error: None,
        };

        for service in &plan.services {
            let service = *service;

            if !plan.last_resort && !self.health.is_available(service).await {
                debug!(level = %plan.level, service = %service, "Service unavailable, skipping");
                continue;
            }

            let timestamp = self.time_provider.now_millis();
            let started = Instant::now();
            let result = tokio::time::timeout(timeout, operation(service, Arc::clone(context))).await;
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            match result {
                Ok(Ok(value)) => {
                    debug!(
                        level = %plan.level,
                        service = %service,
                        latency_ms = latency_ms,
                        "Service attempt succeeded"
                    );
                    outcome.attempts.push(FallbackAttempt::succeeded(
                        plan.level,
                        Some(service),
                        latency_ms,
                        timestamp,
                    ));
                    outcome.winner = Some((service, value));
                    return outcome;
                }
                Ok(Err(e)) => {
                    warn!(level = %plan.level, service = %service, error = %e, "Service attempt failed");
                    let message = e.to_string();
                    outcome.attempts.push(FallbackAttempt::failed(
                        plan.level,
                        Some(service),
                        latency_ms,
                        message.clone(),
                        false,
                        timestamp,
                    ));
                    outcome.last_error = Some(message);
                }
                Err(_) => {
                    let timeout_ms = timeout.as_millis() as u64;
                    warn!(
                        level = %plan.level,
                        service = %service,
                        timeout_ms = timeout_ms,
                        "Service attempt timed out"
                    );
                    let message = ServiceError::Timeout(timeout_ms).to_string();
                    outcome.attempts.push(FallbackAttempt::failed(
                        plan.level,
                        Some(service),
                        latency_ms,
                        message.clone(),
                        true,
                        timestamp,
                    ));
                    outcome.last_error = Some(message);
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FallbackLevel;
    use crate::port::time_provider::ManualTimeProvider;
    use crate::port::InMemoryHealthProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn executor(health: Arc<InMemoryHealthProvider>) -> LevelExecutor {
        LevelExecutor::new(health, Arc::new(ManualTimeProvider::new(1_000)))
    }

    fn plan(services: Vec<ServiceType>) -> LevelPlan {
        LevelPlan::new(FallbackLevel::Primary, services)
    }

    #[tokio::test]
    async fn test_stops_after_first_success() {
        let exec = executor(Arc::new(InMemoryHealthProvider::new()));
        let calls = AtomicUsize::new(0);
        let op = |service: ServiceType, _ctx: Arc<ContextData>| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, ServiceError>(service.to_string()) }
        };

        let outcome = exec
            .execute_level(
                &plan(vec![ServiceType::Redis, ServiceType::Database]),
                &op,
                &FallbackConfig::default(),
                &Arc::new(ContextData::new()),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.winner, Some((ServiceType::Redis, "redis".to_string())));
    }

    #[tokio::test]
    async fn test_failures_recorded_and_next_service_tried() {
        let exec = executor(Arc::new(InMemoryHealthProvider::new()));
        let op = |service: ServiceType, _ctx: Arc<ContextData>| async move {
            if service == ServiceType::Redis {
                Err(ServiceError::operation("connection refused"))
            } else {
                Ok(42)
            }
        };

        let outcome = exec
            .execute_level(
                &plan(vec![ServiceType::Redis, ServiceType::Database]),
                &op,
                &FallbackConfig::default(),
                &Arc::new(ContextData::new()),
            )
            .await;

        assert_eq!(outcome.attempts.len(), 2);
        assert!(!outcome.attempts[0].success);
        assert!(outcome.attempts[0]
            .error
            .as_deref()
            .unwrap()
            .contains("connection refused"));
        assert_eq!(outcome.winner, Some((ServiceType::Database, 42)));
    }

    #[tokio::test]
    async fn test_timeout_marked_and_level_fails() {
        let exec = executor(Arc::new(InMemoryHealthProvider::new()));
        let config = FallbackConfig {
            timeout_per_level_ms: 20,
            ..Default::default()
        };
        let op = |_service: ServiceType, _ctx: Arc<ContextData>| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<_, ServiceError>(())
        };

        let outcome = exec
            .execute_level(
                &plan(vec![ServiceType::Redis]),
                &op,
                &config,
                &Arc::new(ContextData::new()),
            )
            .await;

        assert!(!outcome.succeeded());
        assert_eq!(outcome.attempts.len(), 1);
        assert!(outcome.attempts[0].timed_out);
        assert!(outcome.last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_unavailable_service_not_invoked() {
        let health = Arc::new(InMemoryHealthProvider::new());
        health.set_available(ServiceType::Redis, false).await;
        let exec = executor(health);
        let op = |service: ServiceType, _ctx: Arc<ContextData>| async move {
            assert_ne!(service, ServiceType::Redis);
            Ok::<_, ServiceError>(())
        };

        let outcome = exec
            .execute_level(
                &plan(vec![ServiceType::Redis, ServiceType::Database]),
                &op,
                &FallbackConfig::default(),
                &Arc::new(ContextData::new()),
            )
            .await;

        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.attempts[0].service, Some(ServiceType::Database));
    }

    #[tokio::test]
    async fn test_last_resort_attempts_unavailable_services() {
        let health = Arc::new(InMemoryHealthProvider::new());
        health.set_available(ServiceType::Database, false).await;
        let exec = executor(health);
        let op = |_service: ServiceType, _ctx: Arc<ContextData>| async { Ok::<_, ServiceError>(1) };

        let outcome = exec
            .execute_level(
                &LevelPlan::last_resort(FallbackLevel::Tertiary, vec![ServiceType::Database]),
                &op,
                &FallbackConfig::default(),
                &Arc::new(ContextData::new()),
            )
            .await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts[0].level, FallbackLevel::Tertiary);
    }
}
