// Recovery system configuration
//
// Field names match the `recovery_*` keys the daemon loads from
// `resilience.toml` / `RESILIENCE_*` environment variables.

use crate::domain::RetryParams;
use crate::error::{AppError, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Capacity of each priority bucket
    #[serde(alias = "recovery_max_queue_size")]
    pub max_queue_size: usize,
    /// Operations executed per recovery cycle
    #[serde(alias = "recovery_worker_batch_size")]
    pub worker_batch_size: usize,
    /// Items handed to a sync executor per batch
    #[serde(alias = "recovery_sync_batch_size")]
    pub sync_batch_size: usize,

    pub recovery_interval_ms: u64,
    pub sync_interval_ms: u64,
    pub health_check_interval_ms: u64,

    pub dead_letter_max_size: usize,
    /// Fraction of successful recoveries that get a consistency check
    pub consistency_sample_rate: f64,
    pub operation_timeout_ms: u64,
    /// Critical operations executed synchronously during shutdown
    pub shutdown_drain_limit: usize,

    pub default_max_retry_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10_000,
            worker_batch_size: 10,
            sync_batch_size: 100,
            recovery_interval_ms: 1_000,
            sync_interval_ms: 10_000,
            health_check_interval_ms: 30_000,
            dead_letter_max_size: 10_000,
            consistency_sample_rate: 0.1,
            operation_timeout_ms: 30_000,
            shutdown_drain_limit: 10,
            default_max_retry_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 300_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RecoveryConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_queue_size", self.max_queue_size),
            ("worker_batch_size", self.worker_batch_size),
            ("sync_batch_size", self.sync_batch_size),
            ("dead_letter_max_size", self.dead_letter_max_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(AppError::Config(format!("{} must be greater than zero", name)));
            }
        }

        let intervals = [
            ("recovery_interval_ms", self.recovery_interval_ms),
            ("sync_interval_ms", self.sync_interval_ms),
            ("health_check_interval_ms", self.health_check_interval_ms),
            ("operation_timeout_ms", self.operation_timeout_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(AppError::Config(format!("{} must be greater than zero", name)));
            }
        }

        if !(0.0..=1.0).contains(&self.consistency_sample_rate) {
            return Err(AppError::Config(format!(
                "consistency_sample_rate must be within 0.0..=1.0, got {}",
                self.consistency_sample_rate
            )));
        }
        self.default_retry_params()
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        Ok(())
    }

    /// Retry parameters applied when a schedule request brings none
    pub fn default_retry_params(&self) -> RetryParams {
        RetryParams {
            max_retry_attempts: self.default_max_retry_attempts,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            backoff_multiplier: self.backoff_multiplier,
        }
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_millis(self.recovery_interval_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}
