// Retry policy for recovery operations
use crate::application::recovery::constants::{MIN_RETRY_DELAY_MS, RETRY_JITTER_RATIO};
use crate::domain::{RecoveryOperation, RetryParams};
use rand::Rng;
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation (with backoff delay in ms)
    Retry(i64),
    /// Do not retry, move to the dead letter queue
    DeadLetter,
}

/// Exponential backoff with jitter
///
/// delay = min(base_delay * multiplier ^ retry_count, max_delay) * (1.0 ± 0.1),
/// floored at 100ms. `max_delay` is itself capped at `RetryParams::MAX_DELAY_MS`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RetryPolicy;

impl RetryPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Decide what happens after a failed attempt
    pub fn decide(&self, op: &RecoveryOperation) -> RetryDecision {
        if op.retries_exhausted() {
            warn!(
                operation_id = %op.id,
                retry_count = op.retry_count,
                max_retry_attempts = op.retry_params.max_retry_attempts,
                "Max retry attempts reached"
            );
            return RetryDecision::DeadLetter;
        }

        let delay_ms = self.compute_delay(op.retry_count, &op.retry_params);

        info!(
            operation_id = %op.id,
            retry_count = op.retry_count,
            delay_ms = delay_ms,
            "Scheduling retry"
        );

        RetryDecision::Retry(delay_ms)
    }

    /// Jittered delay in ms for the given retry count
    pub fn compute_delay(&self, retry_count: u32, params: &RetryParams) -> i64 {
        let jitter = rand::thread_rng().gen_range(-RETRY_JITTER_RATIO..=RETRY_JITTER_RATIO);
        Self::delay_with_jitter(retry_count, params, jitter)
    }

    /// Delay for an explicit jitter factor in -0.1..=0.1
    pub fn delay_with_jitter(retry_count: u32, params: &RetryParams, jitter: f64) -> i64 {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let raw = params.base_delay_ms as f64 * params.backoff_multiplier.powi(exponent);
        let capped = raw
            .min(params.max_delay_ms as f64)
            .min(RetryParams::MAX_DELAY_MS as f64);
        let jittered = capped * (1.0 + jitter);

        (jittered as i64).max(MIN_RETRY_DELAY_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RetryParams {
        RetryParams {
            max_retry_attempts: 6,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_backoff_schedule_within_jitter() {
        let policy = RetryPolicy::new();
        let expected = [2_000.0, 4_000.0, 8_000.0, 16_000.0, 30_000.0, 30_000.0];

        for (i, want) in expected.iter().enumerate() {
            let retry_count = (i + 1) as u32;
            for _ in 0..50 {
                let delay = policy.compute_delay(retry_count, &params()) as f64;
                assert!(
                    delay >= want * 0.9 - 1.0 && delay <= want * 1.1 + 1.0,
                    "retry {} produced {}ms, expected ~{}ms",
                    retry_count,
                    delay,
                    want
                );
            }
        }
    }

    #[test]
    fn test_jitter_bounds_exact() {
        assert_eq!(RetryPolicy::delay_with_jitter(1, &params(), 0.1), 2_200);
        assert_eq!(RetryPolicy::delay_with_jitter(1, &params(), -0.1), 1_800);
        assert_eq!(RetryPolicy::delay_with_jitter(10, &params(), 0.0), 30_000);
    }

    #[test]
    fn test_delay_floor() {
        let tiny = RetryParams {
            base_delay_ms: 10,
            max_delay_ms: 10,
            ..params()
        };
        assert_eq!(RetryPolicy::delay_with_jitter(0, &tiny, -0.1), MIN_RETRY_DELAY_MS);
    }

    #[test]
    fn test_huge_retry_count_saturates_at_max() {
        assert_eq!(RetryPolicy::delay_with_jitter(u32::MAX, &params(), 0.0), 30_000);
    }

    #[test]
    fn test_unbounded_params_capped() {
        let unbounded = RetryParams {
            max_retry_attempts: 3,
            base_delay_ms: u64::MAX,
            max_delay_ms: u64::MAX,
            backoff_multiplier: 2.0,
        };
        let cap = RetryParams::MAX_DELAY_MS as i64;
        assert_eq!(RetryPolicy::delay_with_jitter(0, &unbounded, 0.0), cap);
        assert!(RetryPolicy::delay_with_jitter(u32::MAX, &unbounded, 0.1) <= cap + cap / 10);
    }
}
