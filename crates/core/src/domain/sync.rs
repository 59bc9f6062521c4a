// Background Sync Domain Model

use crate::domain::{RecoveryPriority, ServiceType};
use serde::{Deserialize, Serialize};

/// Sync job ID (UUID v4)
pub type SyncJobId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    FullSync,
    IncrementalSync,
    DataRepair,
}

impl std::fmt::Display for SyncType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncType::FullSync => write!(f, "FULL_SYNC"),
            SyncType::IncrementalSync => write!(f, "INCREMENTAL_SYNC"),
            SyncType::DataRepair => write!(f, "DATA_REPAIR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One unit of reconciliation work handed to a sync executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncItem {
    Key(String),
    Data(serde_json::Value),
}

/// Background reconciliation job
///
/// Never retried automatically: a failed job stays failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: SyncJobId,
    pub service_type: ServiceType,
    pub sync_type: SyncType,
    pub priority: RecoveryPriority,
    pub source_keys: Vec<String>,
    pub target_keys: Vec<String>,
    pub data_items: Vec<serde_json::Value>,

    pub status: SyncStatus,
    pub progress_percent: f64,
    pub items_processed: usize,

    pub created_at: i64, // epoch ms
    pub scheduled_at: Option<i64>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub error_message: Option<String>,
}

impl SyncJob {
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        service_type: ServiceType,
        sync_type: SyncType,
        priority: RecoveryPriority,
    ) -> Self {
        Self {
            id: id.into(),
            service_type,
            sync_type,
            priority,
            source_keys: Vec::new(),
            target_keys: Vec::new(),
            data_items: Vec::new(),
            status: SyncStatus::Pending,
            progress_percent: 0.0,
            items_processed: 0,
            created_at,
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    /// Pending and past its scheduled time (if any)
    pub fn is_ready(&self, now_millis: i64) -> bool {
        self.status == SyncStatus::Pending && self.scheduled_at.map_or(true, |at| now_millis >= at)
    }

    /// Items to reconcile, ordered by sync kind
    ///
    /// - FullSync: every source key, then every data item
    /// - IncrementalSync: data items first, then source keys
    /// - DataRepair: target keys
    pub fn work_items(&self) -> Vec<SyncItem> {
        let keys = |keys: &[String]| keys.iter().cloned().map(SyncItem::Key).collect::<Vec<_>>();
        let data = || {
            self.data_items
                .iter()
                .cloned()
                .map(SyncItem::Data)
                .collect::<Vec<_>>()
        };

        match self.sync_type {
            SyncType::FullSync => {
                let mut items = keys(&self.source_keys);
                items.extend(data());
                items
            }
            SyncType::IncrementalSync => {
                let mut items = data();
                items.extend(keys(&self.source_keys));
                items
            }
            SyncType::DataRepair => keys(&self.target_keys),
        }
    }

    pub fn start(&mut self, now_millis: i64) {
        self.status = SyncStatus::Running;
        self.started_at = Some(now_millis);
        self.progress_percent = 0.0;
    }

    pub fn update_progress(&mut self, processed: usize, total: usize) {
        self.items_processed = processed;
        self.progress_percent = if total == 0 {
            100.0
        } else {
            (processed as f64 / total as f64) * 100.0
        };
    }

    pub fn complete(&mut self, now_millis: i64) {
        self.status = SyncStatus::Completed;
        self.progress_percent = 100.0;
        self.completed_at = Some(now_millis);
    }

    pub fn fail(&mut self, error: impl Into<String>, now_millis: i64) {
        self.status = SyncStatus::Failed;
        self.error_message = Some(error.into());
        self.completed_at = Some(now_millis);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(sync_type: SyncType) -> SyncJob {
        let mut job = SyncJob::new(
            "sync-1",
            1_000,
            ServiceType::Redis,
            sync_type,
            RecoveryPriority::Normal,
        );
        job.source_keys = vec!["a".to_string(), "b".to_string()];
        job.target_keys = vec!["t".to_string()];
        job.data_items = vec![json!({"k": 1})];
        job
    }

    #[test]
    fn test_incremental_sync_orders_data_first() {
        let items = job(SyncType::IncrementalSync).work_items();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], SyncItem::Data(json!({"k": 1})));
        assert_eq!(items[1], SyncItem::Key("a".to_string()));
    }

    #[test]
    fn test_data_repair_uses_target_keys() {
        let items = job(SyncType::DataRepair).work_items();
        assert_eq!(items, vec![SyncItem::Key("t".to_string())]);
    }

    #[test]
    fn test_scheduled_job_not_ready_before_time() {
        let mut job = job(SyncType::FullSync);
        job.scheduled_at = Some(5_000);
        assert!(!job.is_ready(4_999));
        assert!(job.is_ready(5_000));

        job.start(5_000);
        assert!(!job.is_ready(6_000), "running job is not ready again");
    }

    #[test]
    fn test_progress_for_empty_job_is_complete() {
        let mut job = SyncJob::new(
            "sync-2",
            0,
            ServiceType::Database,
            SyncType::IncrementalSync,
            RecoveryPriority::High,
        );
        job.update_progress(0, 0);
        assert_eq!(job.progress_percent, 100.0);
    }
}
