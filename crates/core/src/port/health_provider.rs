// Service Health Provider port
// Measurement is the provider's job; the core only reads availability and metrics.
use crate::domain::ServiceType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Per-service health snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMetrics {
    pub response_time_ms: f64,
    /// Percent (0.0 - 100.0)
    pub success_rate: f64,
    pub is_available: bool,
    pub circuit_breaker_open: bool,
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self {
            response_time_ms: 0.0,
            success_rate: 100.0,
            is_available: true,
            circuit_breaker_open: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Whole-system health summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub overall_health: OverallHealth,
    pub fallback_active: bool,
    pub emergency_mode: bool,
}

/// Health provider port
///
/// Used by the strategy manager, the level executor and the recovery system
#[async_trait]
pub trait ServiceHealthProvider: Send + Sync {
    /// Whether `service` should receive traffic right now
    async fn is_available(&self, service: ServiceType) -> bool;

    /// Current metrics for `service`
    async fn metrics(&self, service: ServiceType) -> ServiceMetrics;

    /// Aggregated health across all services
    async fn system_health(&self) -> SystemHealth;
}

/// Settable in-memory health provider
///
/// Services never reported on are considered healthy. Used by the daemon's
/// simulated tiers and by tests.
#[derive(Default)]
pub struct InMemoryHealthProvider {
    metrics: RwLock<HashMap<ServiceType, ServiceMetrics>>,
}

impl InMemoryHealthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_available(&self, service: ServiceType, available: bool) {
        let mut metrics = self.metrics.write().await;
        metrics.entry(service).or_default().is_available = available;
    }

    pub async fn set_circuit_open(&self, service: ServiceType, open: bool) {
        let mut metrics = self.metrics.write().await;
        metrics.entry(service).or_default().circuit_breaker_open = open;
    }

    pub async fn set_metrics(&self, service: ServiceType, value: ServiceMetrics) {
        self.metrics.write().await.insert(service, value);
    }
}

#[async_trait]
impl ServiceHealthProvider for InMemoryHealthProvider {
    async fn is_available(&self, service: ServiceType) -> bool {
        let metrics = self.metrics(service).await;
        metrics.is_available && !metrics.circuit_breaker_open
    }

    async fn metrics(&self, service: ServiceType) -> ServiceMetrics {
        self.metrics
            .read()
            .await
            .get(&service)
            .cloned()
            .unwrap_or_default()
    }

    async fn system_health(&self) -> SystemHealth {
        let mut available = 0;
        for service in ServiceType::ALL {
            if self.is_available(service).await {
                available += 1;
            }
        }

        let overall_health = match available {
            n if n == ServiceType::ALL.len() => OverallHealth::Healthy,
            0 => OverallHealth::Unhealthy,
            _ => OverallHealth::Degraded,
        };

        SystemHealth {
            overall_health,
            fallback_active: available < ServiceType::ALL.len(),
            emergency_mode: available == 0,
        }
    }
}
