// Priority buckets for queued recovery operations
use crate::domain::{RecoveryOperation, RecoveryPriority};
use std::collections::{BTreeMap, VecDeque};

/// One FIFO bucket per priority, each bounded by `max_size`
pub struct PriorityQueues {
    buckets: BTreeMap<RecoveryPriority, VecDeque<RecoveryOperation>>,
    max_size: usize,
}

impl PriorityQueues {
    pub fn new(max_size: usize) -> Self {
        let buckets = RecoveryPriority::ALL
            .iter()
            .map(|p| (*p, VecDeque::new()))
            .collect();
        Self { buckets, max_size }
    }

    /// Append to the tail of the operation's bucket
    ///
    /// # Errors
    /// Hands the operation back when its bucket is full.
    pub fn push(&mut self, op: RecoveryOperation) -> Result<(), RecoveryOperation> {
        let max_size = self.max_size;
        let bucket = self.buckets.entry(op.priority).or_default();
        if bucket.len() >= max_size {
            return Err(op);
        }
        bucket.push_back(op);
        Ok(())
    }

    /// Up to `limit` ready operations from the first bucket that has any
    ///
    /// Buckets are scanned Critical first. Operations inspected but not yet
    /// ready are moved to the tail of their bucket. Lower buckets are not
    /// touched once a bucket yields work.
    pub fn take_ready_batch(&mut self, now_millis: i64, limit: usize) -> Vec<RecoveryOperation> {
        let mut batch = Vec::new();

        for priority in RecoveryPriority::ALL {
            let Some(bucket) = self.buckets.get_mut(&priority) else {
                continue;
            };

            for _ in 0..bucket.len() {
                if batch.len() >= limit {
                    break;
                }
                let Some(op) = bucket.pop_front() else {
                    break;
                };
                if op.is_ready(now_millis) {
                    batch.push(op);
                } else {
                    bucket.push_back(op);
                }
            }

            if !batch.is_empty() {
                break;
            }
        }

        batch
    }

    /// Up to `limit` Critical operations from the head of the bucket, ready or not
    pub fn take_critical(&mut self, limit: usize) -> Vec<RecoveryOperation> {
        let Some(bucket) = self.buckets.get_mut(&RecoveryPriority::Critical) else {
            return Vec::new();
        };
        let count = limit.min(bucket.len());
        bucket.drain(..count).collect()
    }

    pub fn contains(&self, operation_id: &str) -> bool {
        self.buckets
            .values()
            .any(|bucket| bucket.iter().any(|op| op.id == operation_id))
    }

    pub fn lengths(&self) -> BTreeMap<RecoveryPriority, usize> {
        self.buckets.iter().map(|(p, b)| (*p, b.len())).collect()
    }

    pub fn total_len(&self) -> usize {
        self.buckets.values().map(VecDeque::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FailureCategory, OperationType, RecoveryType, ServiceType};
    use crate::domain::ServiceError;
    use crate::port::FnRecoveryTask;
    use std::sync::Arc;

    fn op(id: &str, priority: RecoveryPriority, next_retry_at: Option<i64>) -> RecoveryOperation {
        let mut op = RecoveryOperation::new(
            id,
            0,
            Arc::new(FnRecoveryTask::new(|| async {
                Ok::<_, ServiceError>(serde_json::Value::Null)
            })),
            RecoveryType::DelayedRetry,
            FailureCategory::Transient,
            priority,
            OperationType::CacheWrite,
            ServiceType::Redis,
        );
        op.next_retry_at = next_retry_at;
        op
    }

    fn ids(ops: &[RecoveryOperation]) -> Vec<&str> {
        ops.iter().map(|o| o.id.as_str()).collect()
    }

    #[test]
    fn test_push_rejects_when_bucket_full() {
        let mut queues = PriorityQueues::new(1);
        assert!(queues.push(op("a", RecoveryPriority::Low, None)).is_ok());
        let rejected = queues.push(op("b", RecoveryPriority::Low, None)).unwrap_err();
        assert_eq!(rejected.id, "b");

        // Other buckets have their own capacity
        assert!(queues.push(op("c", RecoveryPriority::High, None)).is_ok());
        assert_eq!(queues.total_len(), 2);
    }

    #[test]
    fn test_first_bucket_with_ready_work_wins_cycle() {
        let mut queues = PriorityQueues::new(100);
        queues.push(op("low", RecoveryPriority::Low, None)).unwrap();
        queues.push(op("high-1", RecoveryPriority::High, None)).unwrap();
        queues.push(op("high-2", RecoveryPriority::High, None)).unwrap();

        let batch = queues.take_ready_batch(0, 10);
        assert_eq!(ids(&batch), vec!["high-1", "high-2"]);
        assert_eq!(queues.lengths()[&RecoveryPriority::Low], 1);
    }

    #[test]
    fn test_not_ready_operations_rotate_to_tail() {
        let mut queues = PriorityQueues::new(100);
        queues
            .push(op("later", RecoveryPriority::Critical, Some(5_000)))
            .unwrap();
        queues.push(op("now", RecoveryPriority::Critical, None)).unwrap();
        queues.push(op("normal", RecoveryPriority::Normal, None)).unwrap();

        let batch = queues.take_ready_batch(1_000, 10);
        assert_eq!(ids(&batch), vec!["now"]);
        assert!(queues.contains("later"));
        assert!(queues.contains("normal"));
    }

    #[test]
    fn test_scan_falls_through_when_bucket_not_ready() {
        let mut queues = PriorityQueues::new(100);
        queues
            .push(op("later", RecoveryPriority::Critical, Some(5_000)))
            .unwrap();
        queues.push(op("normal", RecoveryPriority::Normal, None)).unwrap();

        let batch = queues.take_ready_batch(1_000, 10);
        assert_eq!(ids(&batch), vec!["normal"]);
    }

    #[test]
    fn test_batch_limit() {
        let mut queues = PriorityQueues::new(100);
        for n in 0..5 {
            queues
                .push(op(&format!("op-{}", n), RecoveryPriority::Normal, None))
                .unwrap();
        }

        let batch = queues.take_ready_batch(0, 2);
        assert_eq!(ids(&batch), vec!["op-0", "op-1"]);
        assert_eq!(queues.total_len(), 3);
    }

    #[test]
    fn test_take_critical_ignores_schedule() {
        let mut queues = PriorityQueues::new(100);
        queues
            .push(op("c-1", RecoveryPriority::Critical, Some(i64::MAX)))
            .unwrap();
        queues.push(op("c-2", RecoveryPriority::Critical, None)).unwrap();
        queues.push(op("h-1", RecoveryPriority::High, None)).unwrap();

        let drained = queues.take_critical(1);
        assert_eq!(ids(&drained), vec!["c-1"]);
        assert_eq!(queues.total_len(), 2);
    }
}
