// Recovery constants (no magic values)
use std::time::Duration;

/// Lower bound on any computed retry delay (100ms)
pub const MIN_RETRY_DELAY_MS: i64 = 100;

/// Jitter applied to computed retry delays (±10%)
pub const RETRY_JITTER_RATIO: f64 = 0.1;

/// How long shutdown waits for a background loop before aborting it (5s)
pub const LOOP_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Final error recorded for operations dead-lettered at schedule time
pub const MANUAL_INTERVENTION_ERROR: &str = "Scheduled for manual handling";

/// Final error recorded when a retry finds its priority bucket full
pub const QUEUE_FULL_ERROR: &str = "Recovery queue full on retry";
