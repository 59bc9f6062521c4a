// Recovery Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::{ContextData, OperationType, ServiceType};
use crate::port::{RecoveryCallback, RecoveryTask};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Recovery operation ID (UUID v4)
pub type OperationId = String;

/// How a failure should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryType {
    ImmediateRetry,
    DelayedRetry,
    BackgroundSync,
    DataRepair,
    DeadLetter,
    ManualIntervention,
}

impl std::fmt::Display for RecoveryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryType::ImmediateRetry => write!(f, "IMMEDIATE_RETRY"),
            RecoveryType::DelayedRetry => write!(f, "DELAYED_RETRY"),
            RecoveryType::BackgroundSync => write!(f, "BACKGROUND_SYNC"),
            RecoveryType::DataRepair => write!(f, "DATA_REPAIR"),
            RecoveryType::DeadLetter => write!(f, "DEAD_LETTER"),
            RecoveryType::ManualIntervention => write!(f, "MANUAL_INTERVENTION"),
        }
    }
}

impl RecoveryType {
    /// Types that never enter the automatic retry queues
    pub fn bypasses_queue(&self) -> bool {
        matches!(
            self,
            RecoveryType::DeadLetter | RecoveryType::ManualIntervention
        )
    }
}

/// Why an operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Transient,
    Persistent,
    DataCorruption,
    Authentication,
    ResourceExhaustion,
    Unknown,
}

/// Queue bucket, serviced Critical first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPriority {
    Critical,
    High,
    Normal,
    Low,
}

impl RecoveryPriority {
    /// Buckets in service order
    pub const ALL: [RecoveryPriority; 4] = [
        RecoveryPriority::Critical,
        RecoveryPriority::High,
        RecoveryPriority::Normal,
        RecoveryPriority::Low,
    ];
}

impl std::fmt::Display for RecoveryPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryPriority::Critical => write!(f, "CRITICAL"),
            RecoveryPriority::High => write!(f, "HIGH"),
            RecoveryPriority::Normal => write!(f, "NORMAL"),
            RecoveryPriority::Low => write!(f, "LOW"),
        }
    }
}

/// Lifecycle of one recovery operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryState {
    Queued,
    Attempting,
    RetryScheduled,
    Succeeded,
    DeadLettered,
}

impl std::fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryState::Queued => write!(f, "QUEUED"),
            RecoveryState::Attempting => write!(f, "ATTEMPTING"),
            RecoveryState::RetryScheduled => write!(f, "RETRY_SCHEDULED"),
            RecoveryState::Succeeded => write!(f, "SUCCEEDED"),
            RecoveryState::DeadLettered => write!(f, "DEAD_LETTERED"),
        }
    }
}

/// Per-operation retry parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryParams {
    pub max_retry_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryParams {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 300_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryParams {
    /// Upper bound on any retry delay (24h)
    pub const MAX_DELAY_MS: u64 = 24 * 60 * 60 * 1000;

    pub fn validate(&self) -> crate::domain::error::Result<()> {
        use crate::domain::DomainError::ValidationError;

        if self.max_retry_attempts == 0 {
            return Err(ValidationError(
                "max_retry_attempts must be at least 1".to_string(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ValidationError(format!(
                "backoff_multiplier must be a finite value >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ValidationError(
                "base_delay_ms must not exceed max_delay_ms".to_string(),
            ));
        }
        if self.max_delay_ms > Self::MAX_DELAY_MS {
            return Err(ValidationError(format!(
                "max_delay_ms must not exceed {}, got {}",
                Self::MAX_DELAY_MS,
                self.max_delay_ms
            )));
        }
        Ok(())
    }
}

impl From<&crate::domain::FallbackConfig> for RetryParams {
    fn from(config: &crate::domain::FallbackConfig) -> Self {
        Self {
            max_retry_attempts: config.max_retry_attempts,
            ..Default::default()
        }
    }
}

/// One failed attempt in an operation's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub attempt: u32,
    pub error: String,
    pub failed_at: i64, // epoch ms
}

/// Unit of delayed work owned by the recovery system
#[derive(Clone)]
pub struct RecoveryOperation {
    pub id: OperationId,
    pub recovery_type: RecoveryType,
    pub failure_category: FailureCategory,
    pub priority: RecoveryPriority,
    pub operation_type: OperationType,
    pub service_type: ServiceType,
    pub task: Arc<dyn RecoveryTask>,
    pub context_data: ContextData,
    pub state: RecoveryState,

    pub created_at: i64, // epoch ms
    pub last_attempt_at: Option<i64>,

    // Retry bookkeeping
    pub retry_count: u32,
    pub retry_params: RetryParams,
    pub next_retry_at: Option<i64>, // epoch ms, None = ready now
    pub failure_history: Vec<FailureRecord>,

    pub on_success: Option<RecoveryCallback>,
    pub on_failure: Option<RecoveryCallback>,
}

impl RecoveryOperation {
    /// Create a queued operation
    ///
    /// # Arguments
    ///
    /// * `id` - Unique operation ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        task: Arc<dyn RecoveryTask>,
        recovery_type: RecoveryType,
        failure_category: FailureCategory,
        priority: RecoveryPriority,
        operation_type: OperationType,
        service_type: ServiceType,
    ) -> Self {
        Self {
            id: id.into(),
            recovery_type,
            failure_category,
            priority,
            operation_type,
            service_type,
            task,
            context_data: ContextData::new(),
            state: RecoveryState::Queued,
            created_at,
            last_attempt_at: None,
            retry_count: 0,
            retry_params: RetryParams::default(),
            next_retry_at: None,
            failure_history: Vec::new(),
            on_success: None,
            on_failure: None,
        }
    }

    /// Ready when no retry time is set or it has passed
    pub fn is_ready(&self, now_millis: i64) -> bool {
        self.next_retry_at.map_or(true, |at| now_millis >= at)
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.retry_params.max_retry_attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.failure_history.last().map(|r| r.error.as_str())
    }

    /// Queued -> Attempting, counting the attempt
    pub fn begin_attempt(&mut self, now_millis: i64) -> Result<()> {
        if self.state != RecoveryState::Queued {
            return Err(self.invalid(RecoveryState::Attempting));
        }
        self.state = RecoveryState::Attempting;
        self.retry_count += 1;
        self.last_attempt_at = Some(now_millis);
        Ok(())
    }

    /// Attempting -> Succeeded
    pub fn succeed(&mut self) -> Result<()> {
        if self.state != RecoveryState::Attempting {
            return Err(self.invalid(RecoveryState::Succeeded));
        }
        self.state = RecoveryState::Succeeded;
        self.next_retry_at = None;
        Ok(())
    }

    /// Record a failed attempt (history is append-only)
    pub fn record_failure(&mut self, error: impl Into<String>, now_millis: i64) {
        self.failure_history.push(FailureRecord {
            attempt: self.retry_count,
            error: error.into(),
            failed_at: now_millis,
        });
    }

    /// Attempting -> RetryScheduled
    pub fn schedule_retry(&mut self, next_retry_at: i64) -> Result<()> {
        if self.state != RecoveryState::Attempting {
            return Err(self.invalid(RecoveryState::RetryScheduled));
        }
        self.state = RecoveryState::RetryScheduled;
        self.next_retry_at = Some(next_retry_at);
        Ok(())
    }

    /// RetryScheduled -> Queued
    pub fn requeue(&mut self) -> Result<()> {
        if self.state != RecoveryState::RetryScheduled {
            return Err(self.invalid(RecoveryState::Queued));
        }
        self.state = RecoveryState::Queued;
        Ok(())
    }

    /// Any non-terminal state -> DeadLettered
    pub fn dead_letter(&mut self) -> Result<()> {
        if matches!(
            self.state,
            RecoveryState::Succeeded | RecoveryState::DeadLettered
        ) {
            return Err(self.invalid(RecoveryState::DeadLettered));
        }
        self.state = RecoveryState::DeadLettered;
        Ok(())
    }

    /// DeadLettered -> Queued with a fresh retry budget
    pub fn reset_for_retry(&mut self) -> Result<()> {
        if self.state != RecoveryState::DeadLettered {
            return Err(self.invalid(RecoveryState::Queued));
        }
        self.state = RecoveryState::Queued;
        self.retry_count = 0;
        self.next_retry_at = None;
        Ok(())
    }

    fn invalid(&self, to: RecoveryState) -> DomainError {
        DomainError::InvalidStateTransition {
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }
}

impl std::fmt::Debug for RecoveryOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryOperation")
            .field("id", &self.id)
            .field("recovery_type", &self.recovery_type)
            .field("failure_category", &self.failure_category)
            .field("priority", &self.priority)
            .field("operation_type", &self.operation_type)
            .field("service_type", &self.service_type)
            .field("state", &self.state)
            .field("retry_count", &self.retry_count)
            .field("next_retry_at", &self.next_retry_at)
            .field("failures", &self.failure_history.len())
            .finish()
    }
}

/// Terminal report for one attempt cycle of a recovery operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryResult {
    pub operation_id: OperationId,
    pub success: bool,
    pub attempts_made: u32,
    pub elapsed_ms: i64,
    pub final_error: Option<String>,
    /// None when the check was not sampled
    pub consistency_check_passed: Option<bool>,
    pub value: Option<serde_json::Value>,
}

/// Snapshot of a permanently failed operation
#[derive(Debug, Clone)]
pub struct DeadLetterItem {
    pub operation: RecoveryOperation,
    pub final_error: String,
    pub retry_attempts_made: u32,
    pub dead_lettered_at: i64, // epoch ms
}

impl DeadLetterItem {
    pub fn id(&self) -> &str {
        &self.operation.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::FnRecoveryTask;

    fn operation() -> RecoveryOperation {
        RecoveryOperation::new(
            "op-1",
            1_000,
            Arc::new(FnRecoveryTask::new(|| async {
                Ok::<_, crate::domain::ServiceError>(serde_json::json!({}))
            })),
            RecoveryType::DelayedRetry,
            FailureCategory::Transient,
            RecoveryPriority::Normal,
            OperationType::CacheWrite,
            ServiceType::Redis,
        )
    }

    #[test]
    fn test_attempt_increments_retry_count() {
        let mut op = operation();
        op.begin_attempt(2_000).unwrap();
        assert_eq!(op.retry_count, 1);
        assert_eq!(op.state, RecoveryState::Attempting);
        assert_eq!(op.last_attempt_at, Some(2_000));
    }

    #[test]
    fn test_retry_cycle_returns_to_queued() {
        let mut op = operation();
        op.begin_attempt(2_000).unwrap();
        op.record_failure("boom", 2_001);
        op.schedule_retry(5_000).unwrap();
        op.requeue().unwrap();

        assert_eq!(op.state, RecoveryState::Queued);
        assert!(!op.is_ready(4_999));
        assert!(op.is_ready(5_000));
        assert_eq!(op.last_error(), Some("boom"));
    }

    #[test]
    fn test_cannot_attempt_twice_without_requeue() {
        let mut op = operation();
        op.begin_attempt(2_000).unwrap();
        let err = op.begin_attempt(2_001).unwrap_err();
        assert!(err.to_string().contains("ATTEMPTING"));
    }

    #[test]
    fn test_succeeded_is_terminal() {
        let mut op = operation();
        op.begin_attempt(2_000).unwrap();
        op.succeed().unwrap();
        assert!(op.dead_letter().is_err());
        assert!(op.requeue().is_err());
    }

    #[test]
    fn test_reset_for_retry_clears_count() {
        let mut op = operation();
        op.begin_attempt(2_000).unwrap();
        op.dead_letter().unwrap();
        op.reset_for_retry().unwrap();

        assert_eq!(op.retry_count, 0);
        assert_eq!(op.state, RecoveryState::Queued);
        assert!(op.is_ready(0));
    }
}
