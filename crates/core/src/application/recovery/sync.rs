// Background sync worker - owns the sync job table
use crate::domain::{ServiceError, ServiceType, SyncItem, SyncJob, SyncJobId, SyncStatus};
use crate::port::{ServiceHealthProvider, SyncExecutor, TimeProvider};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Job counts by status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncJobCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct SyncWorker {
    jobs: RwLock<HashMap<SyncJobId, SyncJob>>,
    executors: RwLock<HashMap<ServiceType, Arc<dyn SyncExecutor>>>,
    health: Arc<dyn ServiceHealthProvider>,
    time_provider: Arc<dyn TimeProvider>,
    batch_size: usize,
    batch_timeout: Duration,
}

impl SyncWorker {
    pub fn new(
        health: Arc<dyn ServiceHealthProvider>,
        time_provider: Arc<dyn TimeProvider>,
        batch_size: usize,
        batch_timeout: Duration,
    ) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            executors: RwLock::new(HashMap::new()),
            health,
            time_provider,
            batch_size: batch_size.max(1),
            batch_timeout,
        }
    }

    pub async fn register_executor(&self, service: ServiceType, executor: Arc<dyn SyncExecutor>) {
        info!(service = %service, "Registered sync executor");
        self.executors.write().await.insert(service, executor);
    }

    pub async fn insert(&self, job: SyncJob) {
        self.jobs.write().await.insert(job.id.clone(), job);
    }

    pub async fn get(&self, job_id: &str) -> Option<SyncJob> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// Every job, oldest first
    pub async fn list(&self) -> Vec<SyncJob> {
        let mut jobs: Vec<SyncJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    pub async fn counts(&self) -> SyncJobCounts {
        let jobs = self.jobs.read().await;
        let mut counts = SyncJobCounts::default();
        for job in jobs.values() {
            match job.status {
                SyncStatus::Pending => counts.pending += 1,
                SyncStatus::Running => counts.running += 1,
                SyncStatus::Completed => counts.completed += 1,
                SyncStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Run every ready job once, returning how many ran
    ///
    /// Ready jobs run by priority, then creation time. A job whose service is
    /// unavailable stays pending for a later cycle.
    pub async fn process_cycle(&self) -> usize {
        let now = self.time_provider.now_millis();
        let mut ready: Vec<(crate::domain::RecoveryPriority, i64, SyncJobId)> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.is_ready(now))
            .map(|job| (job.priority, job.created_at, job.id.clone()))
            .collect();
        ready.sort();

        let mut ran = 0;
        for (_, _, job_id) in ready {
            if self.run_job(&job_id).await {
                ran += 1;
            }
        }
        ran
    }

    /// Execute one pending job to completion or failure
    async fn run_job(&self, job_id: &str) -> bool {
        let Some(job) = self.get(job_id).await else {
            return false;
        };

        if !self.health.is_available(job.service_type).await {
            debug!(
                job_id = %job_id,
                service = %job.service_type,
                "Sync target unavailable, job stays pending"
            );
            return false;
        }

        let items = job.work_items();
        let total = items.len();
        self.update(job_id, |j| j.start(self.time_provider.now_millis()))
            .await;

        info!(
            job_id = %job_id,
            service = %job.service_type,
            sync_type = %job.sync_type,
            items = total,
            "Sync job started"
        );

        let executor = self.executors.read().await.get(&job.service_type).cloned();
        let mut processed = 0;

        for chunk in items.chunks(self.batch_size) {
            if let Err(e) = self.sync_chunk(executor.as_deref(), &job, chunk).await {
                warn!(job_id = %job_id, error = %e, processed = processed, "Sync job failed");
                let now = self.time_provider.now_millis();
                self.update(job_id, |j| j.fail(e.to_string(), now)).await;
                return true;
            }
            processed += chunk.len();
            self.update(job_id, |j| j.update_progress(processed, total))
                .await;
        }

        let now = self.time_provider.now_millis();
        self.update(job_id, |j| {
            j.update_progress(processed, total);
            j.complete(now);
        })
        .await;
        info!(job_id = %job_id, items = processed, "Sync job completed");
        true
    }

    async fn sync_chunk(
        &self,
        executor: Option<&dyn SyncExecutor>,
        job: &SyncJob,
        chunk: &[SyncItem],
    ) -> Result<(), ServiceError> {
        let Some(executor) = executor else {
            // No executor registered: items are acknowledged as reconciled
            return Ok(());
        };

        match tokio::time::timeout(
            self.batch_timeout,
            executor.sync_batch(job.service_type, job.sync_type, chunk),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout(self.batch_timeout.as_millis() as u64)),
        }
    }

    async fn update(&self, job_id: &str, f: impl FnOnce(&mut SyncJob)) {
        if let Some(job) = self.jobs.write().await.get_mut(job_id) {
            f(job);
        }
    }
}
