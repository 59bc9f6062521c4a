// Fallback Domain Model

use crate::domain::ServiceType;
use crate::port::EmergencyHandler;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Ordered service tier (Primary < Secondary < Tertiary < Emergency)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackLevel {
    Primary,
    Secondary,
    Tertiary,
    Emergency,
}

impl FallbackLevel {
    /// Levels backed by real services, in fallback order
    pub const SERVICE_LEVELS: [FallbackLevel; 3] = [
        FallbackLevel::Primary,
        FallbackLevel::Secondary,
        FallbackLevel::Tertiary,
    ];
}

impl std::fmt::Display for FallbackLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackLevel::Primary => write!(f, "PRIMARY"),
            FallbackLevel::Secondary => write!(f, "SECONDARY"),
            FallbackLevel::Tertiary => write!(f, "TERTIARY"),
            FallbackLevel::Emergency => write!(f, "EMERGENCY"),
        }
    }
}

/// How the strategy manager orders and filters levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    FailFast,
    GracefulDegradation,
    PerformanceFirst,
    ReliabilityFirst,
    EmergencyOnly,
}

/// Per-operation-type fallback policy
///
/// Treated as immutable once handed to an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackConfig {
    pub strategy: FallbackStrategy,
    /// Default retry budget for recovery operations derived from this config
    pub max_retry_attempts: u32,
    pub timeout_per_level_ms: u64,
    pub performance_threshold_ms: f64,
    pub reliability_threshold_percent: f64,
    pub emergency_cache_ttl_secs: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            strategy: FallbackStrategy::GracefulDegradation,
            max_retry_attempts: 3,
            timeout_per_level_ms: 5_000,
            performance_threshold_ms: 1_000.0,
            reliability_threshold_percent: 95.0,
            emergency_cache_ttl_secs: 300,
        }
    }
}

impl FallbackConfig {
    pub fn with_strategy(strategy: FallbackStrategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }

    pub fn timeout_per_level(&self) -> Duration {
        Duration::from_millis(self.timeout_per_level_ms)
    }

    pub fn emergency_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.emergency_cache_ttl_secs)
    }

    pub fn validate(&self) -> crate::domain::error::Result<()> {
        use crate::domain::DomainError::ValidationError;

        if self.timeout_per_level_ms == 0 {
            return Err(ValidationError(
                "timeout_per_level_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_retry_attempts == 0 {
            return Err(ValidationError(
                "max_retry_attempts must be at least 1".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.reliability_threshold_percent) {
            return Err(ValidationError(format!(
                "reliability_threshold_percent out of range: {}",
                self.reliability_threshold_percent
            )));
        }
        if self.performance_threshold_ms < 0.0 || self.performance_threshold_ms.is_nan() {
            return Err(ValidationError(format!(
                "performance_threshold_ms must be non-negative: {}",
                self.performance_threshold_ms
            )));
        }
        Ok(())
    }
}

/// Services eligible at each level for one operation type
///
/// The Emergency level has no service list, only an optional handler.
#[derive(Clone, Default)]
pub struct ServiceLevelMapping {
    pub primary: Vec<ServiceType>,
    pub secondary: Vec<ServiceType>,
    pub tertiary: Vec<ServiceType>,
    pub emergency_handler: Option<Arc<dyn EmergencyHandler>>,
}

impl ServiceLevelMapping {
    pub fn new(primary: Vec<ServiceType>) -> Self {
        Self {
            primary,
            ..Default::default()
        }
    }

    pub fn with_secondary(mut self, services: Vec<ServiceType>) -> Self {
        self.secondary = services;
        self
    }

    pub fn with_tertiary(mut self, services: Vec<ServiceType>) -> Self {
        self.tertiary = services;
        self
    }

    pub fn with_emergency_handler(mut self, handler: Arc<dyn EmergencyHandler>) -> Self {
        self.emergency_handler = Some(handler);
        self
    }

    /// Services configured at `level` (always empty for Emergency)
    pub fn services_for(&self, level: FallbackLevel) -> &[ServiceType] {
        match level {
            FallbackLevel::Primary => &self.primary,
            FallbackLevel::Secondary => &self.secondary,
            FallbackLevel::Tertiary => &self.tertiary,
            FallbackLevel::Emergency => &[],
        }
    }

    /// Every configured service, in level order, without duplicates
    pub fn all_services(&self) -> Vec<ServiceType> {
        let mut services = Vec::new();
        for level in FallbackLevel::SERVICE_LEVELS {
            for service in self.services_for(level) {
                if !services.contains(service) {
                    services.push(*service);
                }
            }
        }
        services
    }
}

impl std::fmt::Debug for ServiceLevelMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceLevelMapping")
            .field("primary", &self.primary)
            .field("secondary", &self.secondary)
            .field("tertiary", &self.tertiary)
            .field("has_emergency_handler", &self.emergency_handler.is_some())
            .finish()
    }
}

/// One entry of a strategy-determined sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelPlan {
    pub level: FallbackLevel,
    pub services: Vec<ServiceType>,
    /// Attempted even when every service reports unavailable
    pub last_resort: bool,
}

impl LevelPlan {
    pub fn new(level: FallbackLevel, services: Vec<ServiceType>) -> Self {
        Self {
            level,
            services,
            last_resort: false,
        }
    }

    pub fn last_resort(level: FallbackLevel, services: Vec<ServiceType>) -> Self {
        Self {
            level,
            services,
            last_resort: true,
        }
    }
}

/// One (level, service) trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackAttempt {
    pub level: FallbackLevel,
    /// None for the emergency handler
    pub service: Option<ServiceType>,
    pub success: bool,
    pub latency_ms: f64,
    pub error: Option<String>,
    pub timed_out: bool,
    pub timestamp: i64, // epoch ms
}

impl FallbackAttempt {
    pub fn succeeded(
        level: FallbackLevel,
        service: Option<ServiceType>,
        latency_ms: f64,
        timestamp: i64,
    ) -> Self {
        Self {
            level,
            service,
            success: true,
            latency_ms,
            error: None,
            timed_out: false,
            timestamp,
        }
    }

    pub fn failed(
        level: FallbackLevel,
        service: Option<ServiceType>,
        latency_ms: f64,
        error: impl Into<String>,
        timed_out: bool,
        timestamp: i64,
    ) -> Self {
        Self {
            level,
            service,
            success: false,
            latency_ms,
            error: Some(error.into()),
            timed_out,
            timestamp,
        }
    }
}

/// Outcome of one `execute_with_fallback` call
///
/// `level_used` and `service_used` are only set on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackResult<T> {
    pub success: bool,
    pub value: Option<T>,
    pub level_used: Option<FallbackLevel>,
    pub service_used: Option<ServiceType>,
    pub attempts: Vec<FallbackAttempt>,
    pub total_time_ms: f64,
    pub fallback_active: bool,
    pub error_message: Option<String>,
}

impl<T> FallbackResult<T> {
    /// Empty, not-yet-successful result
    pub fn pending() -> Self {
        Self {
            success: false,
            value: None,
            level_used: None,
            service_used: None,
            attempts: Vec::new(),
            total_time_ms: 0.0,
            fallback_active: false,
            error_message: None,
        }
    }

    /// Mark the result as won at `level`
    pub fn win(&mut self, level: FallbackLevel, service: Option<ServiceType>, value: T) {
        self.success = true;
        self.value = Some(value);
        self.level_used = Some(level);
        self.service_used = service;
        self.fallback_active = level != FallbackLevel::Primary;
        self.error_message = None;
    }
}
