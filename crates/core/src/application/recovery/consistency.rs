// Sampled shape validation of recovered values
use crate::domain::OperationType;
use rand::Rng;
use serde_json::Value;
use tracing::warn;

const SESSION_FIELDS: [&str; 2] = ["session_id", "user_id"];
const USER_CONTEXT_FIELDS: [&str; 1] = ["user_id"];

pub struct ConsistencyChecker {
    sample_rate: f64,
}

impl ConsistencyChecker {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate: sample_rate.clamp(0.0, 1.0),
        }
    }

    /// Check a sampled fraction of values; None when not sampled
    pub fn sample(&self, operation_type: OperationType, value: &Value) -> Option<bool> {
        if self.sample_rate <= 0.0 || rand::thread_rng().gen::<f64>() >= self.sample_rate {
            return None;
        }
        Some(self.check(operation_type, value))
    }

    /// Type-specific structural check
    ///
    /// Session values need `session_id` and `user_id`, user-context values
    /// need `user_id`. Everything else only has to be non-null.
    pub fn check(&self, operation_type: OperationType, value: &Value) -> bool {
        let required: &[&str] = if operation_type.is_session() {
            &SESSION_FIELDS
        } else if operation_type.is_user_context() {
            &USER_CONTEXT_FIELDS
        } else {
            &[]
        };

        if value.is_null() {
            warn!(operation_type = %operation_type, "Recovered value is null");
            return false;
        }

        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|field| value.get(*field).map_or(true, Value::is_null))
            .collect();

        if !missing.is_empty() {
            warn!(
                operation_type = %operation_type,
                missing = ?missing,
                "Recovered value failed consistency check"
            );
            return false;
        }
        true
    }
}
