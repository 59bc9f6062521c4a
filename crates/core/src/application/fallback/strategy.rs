//! Fallback Strategy Manager
//!
//! Turns a configured strategy plus live health data into the ordered
//! sequence of levels the orchestrator walks:
//! - FailFast: Primary only
//! - GracefulDegradation: Primary -> Secondary -> Tertiary, filtered to
//!   available services; Tertiary is always kept as last resort
//! - PerformanceFirst: ascending mean response time, over-threshold levels deferred
//! - ReliabilityFirst: descending mean success rate, under-threshold levels deferred
//! - EmergencyOnly: empty (the orchestrator goes straight to the emergency path)

use crate::domain::{
    ContextData, FallbackConfig, FallbackLevel, FallbackStrategy, LevelPlan, OperationType,
    ServiceLevelMapping, ServiceType,
};
use crate::port::ServiceHealthProvider;
use std::sync::Arc;
use tracing::debug;

pub struct FallbackStrategyManager {
    health: Arc<dyn ServiceHealthProvider>,
}

impl FallbackStrategyManager {
    pub fn new(health: Arc<dyn ServiceHealthProvider>) -> Self {
        Self { health }
    }

    /// Ordered `(level, services)` sequence for one execution
    pub async fn determine_sequence(
        &self,
        operation_type: OperationType,
        config: &FallbackConfig,
        mapping: &ServiceLevelMapping,
        _context: Option<&ContextData>,
    ) -> Vec<LevelPlan> {
        let sequence = match config.strategy {
            FallbackStrategy::FailFast => vec![LevelPlan::new(
                FallbackLevel::Primary,
                mapping.primary.clone(),
            )],
            FallbackStrategy::GracefulDegradation => self.graceful_degradation(mapping).await,
            FallbackStrategy::PerformanceFirst => self.performance_first(config, mapping).await,
            FallbackStrategy::ReliabilityFirst => self.reliability_first(config, mapping).await,
            FallbackStrategy::EmergencyOnly => Vec::new(),
        };

        debug!(
            operation_type = %operation_type,
            strategy = ?config.strategy,
            levels = ?sequence.iter().map(|p| p.level).collect::<Vec<_>>(),
            "Determined fallback sequence"
        );

        sequence
    }

    /// True if the level has nothing worth attempting
    ///
    /// An empty list, or a list whose services all report unavailable
    /// (treated as circuit open), is skipped without recording attempts.
    pub async fn should_skip_level(
        &self,
        level: FallbackLevel,
        services: &[ServiceType],
        _config: &FallbackConfig,
    ) -> bool {
        if services.is_empty() {
            debug!(level = %level, "Skipping level: no services configured");
            return true;
        }

        for service in services {
            if self.health.is_available(*service).await {
                return false;
            }
        }

        debug!(level = %level, "Skipping level: all services unavailable");
        true
    }

    async fn available_services(&self, services: &[ServiceType]) -> Vec<ServiceType> {
        let mut available = Vec::with_capacity(services.len());
        for service in services {
            if self.health.is_available(*service).await {
                available.push(*service);
            }
        }
        available
    }

    async fn graceful_degradation(&self, mapping: &ServiceLevelMapping) -> Vec<LevelPlan> {
        let mut sequence = Vec::new();

        for level in FallbackLevel::SERVICE_LEVELS {
            let configured = mapping.services_for(level);
            if configured.is_empty() {
                continue;
            }

            let available = self.available_services(configured).await;
            if !available.is_empty() {
                sequence.push(LevelPlan::new(level, available));
            } else if level == FallbackLevel::Tertiary {
                // Final real attempt even when nothing reports healthy
                sequence.push(LevelPlan::last_resort(level, configured.to_vec()));
            } else {
                debug!(level = %level, "Dropping level: no available services");
            }
        }

        sequence
    }

    async fn performance_first(
        &self,
        config: &FallbackConfig,
        mapping: &ServiceLevelMapping,
    ) -> Vec<LevelPlan> {
        let mut scored = Vec::new();

        for level in FallbackLevel::SERVICE_LEVELS {
            let services = mapping.services_for(level);
            if services.is_empty() {
                continue;
            }

            let mut total = 0.0;
            let mut count = 0usize;
            for service in self.available_services(services).await {
                total += self.health.metrics(service).await.response_time_ms;
                count += 1;
            }
            let mean = if count == 0 {
                f64::INFINITY
            } else {
                total / count as f64
            };

            scored.push((LevelPlan::new(level, services.to_vec()), mean));
        }

        // Stable sorts keep level order on ties
        let (mut within, mut over): (Vec<_>, Vec<_>) = scored
            .into_iter()
            .partition(|(_, mean)| *mean <= config.performance_threshold_ms);
        within.sort_by(|a, b| a.1.total_cmp(&b.1));
        over.sort_by(|a, b| a.1.total_cmp(&b.1));

        within.into_iter().chain(over).map(|(plan, _)| plan).collect()
    }

    async fn reliability_first(
        &self,
        config: &FallbackConfig,
        mapping: &ServiceLevelMapping,
    ) -> Vec<LevelPlan> {
        let mut scored = Vec::new();

        for level in FallbackLevel::SERVICE_LEVELS {
            let services = mapping.services_for(level);
            if services.is_empty() {
                continue;
            }

            let mut total = 0.0;
            let mut count = 0usize;
            for service in self.available_services(services).await {
                total += self.health.metrics(service).await.success_rate;
                count += 1;
            }
            let mean = if count == 0 {
                f64::NEG_INFINITY
            } else {
                total / count as f64
            };

            scored.push((LevelPlan::new(level, services.to_vec()), mean));
        }

        let (mut reliable, mut unreliable): (Vec<_>, Vec<_>) = scored
            .into_iter()
            .partition(|(_, mean)| *mean >= config.reliability_threshold_percent);
        reliable.sort_by(|a, b| b.1.total_cmp(&a.1));
        unreliable.sort_by(|a, b| b.1.total_cmp(&a.1));

        reliable
            .into_iter()
            .chain(unreliable)
            .map(|(plan, _)| plan)
            .collect()
    }
}
