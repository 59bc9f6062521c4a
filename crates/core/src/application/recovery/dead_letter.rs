// Dead Letter Queue - bounded store of operations that exhausted their retries
use crate::domain::DeadLetterItem;
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetterStats {
    pub total: usize,
    pub max_size: usize,
    pub utilization_percent: f64,
}

/// Ring buffer: adding past `max_size` evicts the oldest item
pub struct DeadLetterQueue {
    items: Mutex<VecDeque<DeadLetterItem>>,
    max_size: usize,
}

impl DeadLetterQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            max_size: max_size.max(1),
        }
    }

    /// Append an item, returning the evicted one if the buffer was full
    pub async fn add(&self, item: DeadLetterItem) -> Option<DeadLetterItem> {
        let mut items = self.items.lock().await;
        let evicted = if items.len() >= self.max_size {
            items.pop_front()
        } else {
            None
        };

        if let Some(old) = &evicted {
            warn!(
                operation_id = %old.id(),
                max_size = self.max_size,
                "Dead letter queue full, evicted oldest item"
            );
        }

        items.push_back(item);
        evicted
    }

    /// Up to `limit` items, oldest first
    pub async fn get(&self, limit: usize) -> Vec<DeadLetterItem> {
        self.items.lock().await.iter().take(limit).cloned().collect()
    }

    pub async fn remove(&self, operation_id: &str) -> Option<DeadLetterItem> {
        let mut items = self.items.lock().await;
        let index = items.iter().position(|item| item.id() == operation_id)?;
        items.remove(index)
    }

    pub async fn contains(&self, operation_id: &str) -> bool {
        self.items.lock().await.iter().any(|item| item.id() == operation_id)
    }

    /// Drop everything, returning how many items were held
    pub async fn clear(&self) -> usize {
        let mut items = self.items.lock().await;
        let count = items.len();
        items.clear();
        count
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn stats(&self) -> DeadLetterStats {
        let total = self.len().await;
        DeadLetterStats {
            total,
            max_size: self.max_size,
            utilization_percent: (total as f64 / self.max_size as f64) * 100.0,
        }
    }
}
