// Error Recovery System - retry queues, dead letters, background sync
//
// Owns the priority queues, the dead letter queue and the sync job table.
// External code only reaches them through the methods below.

pub mod constants;
pub mod consistency;
pub mod dead_letter;
mod guard;
pub mod queue;
pub mod retry;
pub mod sync;

use constants::*;
pub use consistency::ConsistencyChecker;
pub use dead_letter::{DeadLetterQueue, DeadLetterStats};
pub use queue::PriorityQueues;
pub use retry::{RetryDecision, RetryPolicy};
pub use sync::{SyncJobCounts, SyncWorker};

use crate::application::shutdown::{ShutdownSender, ShutdownToken};
use crate::config::RecoveryConfig;
use crate::domain::{
    ContextData, DeadLetterItem, FailureCategory, OperationId, OperationType, RecoveryOperation,
    RecoveryPriority, RecoveryResult, RecoveryType, RetryParams, ServiceError, ServiceType,
    SyncJob, SyncJobId, SyncType,
};
use crate::error::Result;
use crate::port::{
    IdProvider, RecoveryCallback, RecoveryTask, ServiceHealthProvider, ServiceRecoveryCallback,
    SyncExecutor, TimeProvider,
};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Parameters of one `schedule_recovery_operation` call
pub struct RecoveryRequest {
    pub task: Arc<dyn RecoveryTask>,
    pub recovery_type: RecoveryType,
    pub failure_category: FailureCategory,
    pub priority: RecoveryPriority,
    pub operation_type: OperationType,
    pub service_type: ServiceType,
    pub context_data: ContextData,
    pub on_success: Option<RecoveryCallback>,
    pub on_failure: Option<RecoveryCallback>,
    /// Falls back to the configured defaults when None or invalid
    pub retry_params: Option<RetryParams>,
}

impl RecoveryRequest {
    /// Delayed, transient, normal-priority retry of `task`
    pub fn new(
        task: Arc<dyn RecoveryTask>,
        operation_type: OperationType,
        service_type: ServiceType,
    ) -> Self {
        Self {
            task,
            recovery_type: RecoveryType::DelayedRetry,
            failure_category: FailureCategory::Transient,
            priority: RecoveryPriority::Normal,
            operation_type,
            service_type,
            context_data: ContextData::new(),
            on_success: None,
            on_failure: None,
            retry_params: None,
        }
    }

    pub fn with_recovery_type(mut self, recovery_type: RecoveryType) -> Self {
        self.recovery_type = recovery_type;
        self
    }

    pub fn with_failure_category(mut self, failure_category: FailureCategory) -> Self {
        self.failure_category = failure_category;
        self
    }

    pub fn with_priority(mut self, priority: RecoveryPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_context(mut self, context_data: ContextData) -> Self {
        self.context_data = context_data;
        self
    }

    pub fn with_retry_params(mut self, retry_params: RetryParams) -> Self {
        self.retry_params = Some(retry_params);
        self
    }

    pub fn on_success(mut self, callback: RecoveryCallback) -> Self {
        self.on_success = Some(callback);
        self
    }

    pub fn on_failure(mut self, callback: RecoveryCallback) -> Self {
        self.on_failure = Some(callback);
        self
    }
}

/// Parameters of one `schedule_background_sync` call
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub service_type: ServiceType,
    pub sync_type: SyncType,
    pub source_keys: Vec<String>,
    pub target_keys: Vec<String>,
    pub data_items: Vec<serde_json::Value>,
    pub priority: RecoveryPriority,
    pub scheduled_at: Option<i64>, // epoch ms
}

impl SyncRequest {
    pub fn new(service_type: ServiceType, sync_type: SyncType) -> Self {
        Self {
            service_type,
            sync_type,
            source_keys: Vec::new(),
            target_keys: Vec::new(),
            data_items: Vec::new(),
            priority: RecoveryPriority::Normal,
            scheduled_at: None,
        }
    }

    pub fn with_source_keys(mut self, keys: Vec<String>) -> Self {
        self.source_keys = keys;
        self
    }

    pub fn with_target_keys(mut self, keys: Vec<String>) -> Self {
        self.target_keys = keys;
        self
    }

    pub fn with_data_items(mut self, items: Vec<serde_json::Value>) -> Self {
        self.data_items = items;
        self
    }

    pub fn with_priority(mut self, priority: RecoveryPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn scheduled_at(mut self, at_millis: i64) -> Self {
        self.scheduled_at = Some(at_millis);
        self
    }
}

/// Counters for one recovery type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryTypeStats {
    pub scheduled: u64,
    pub attempts: u64,
    pub succeeded: u64,
    pub failed_attempts: u64,
    pub retries_scheduled: u64,
    pub dead_lettered: u64,
}

#[derive(Default)]
struct RecoveryCounters {
    by_type: BTreeMap<RecoveryType, RecoveryTypeStats>,
    dropped: u64,
    consistency_failures: u64,
}

impl RecoveryCounters {
    fn for_type(&mut self, recovery_type: RecoveryType) -> &mut RecoveryTypeStats {
        self.by_type.entry(recovery_type).or_default()
    }
}

/// Snapshot returned by `get_recovery_status`
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryStatus {
    pub accepting_work: bool,
    pub queue_lengths: BTreeMap<RecoveryPriority, usize>,
    pub recovery_stats: BTreeMap<RecoveryType, RecoveryTypeStats>,
    pub dropped_operations: u64,
    pub consistency_failures: u64,
    pub sync_jobs: SyncJobCounts,
    pub dead_letter: DeadLetterStats,
    /// Last availability observed by the health monitor
    pub service_health: BTreeMap<ServiceType, bool>,
}

pub struct ErrorRecoverySystem {
    config: RecoveryConfig,
    health: Arc<dyn ServiceHealthProvider>,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
    retry_policy: RetryPolicy,
    consistency: ConsistencyChecker,

    queues: Mutex<PriorityQueues>,
    /// Snapshots of operations taken off the queues and not yet routed
    in_flight: Mutex<HashMap<OperationId, RecoveryOperation>>,
    dead_letters: DeadLetterQueue,
    sync: SyncWorker,

    counters: Mutex<RecoveryCounters>,
    recovery_callbacks: RwLock<HashMap<ServiceType, Vec<ServiceRecoveryCallback>>>,
    last_health: Mutex<BTreeMap<ServiceType, bool>>,

    accepting: AtomicBool,
    shutdown_tx: ShutdownSender,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ErrorRecoverySystem {
    /// Create an idle recovery system; call `start` to run the background loops
    ///
    /// # Errors
    /// Returns `AppError::Config` if `config` fails validation.
    pub fn new(
        config: RecoveryConfig,
        health: Arc<dyn ServiceHealthProvider>,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let sync = SyncWorker::new(
            Arc::clone(&health),
            Arc::clone(&time_provider),
            config.sync_batch_size,
            config.operation_timeout(),
        );
        let (shutdown_tx, _) = crate::application::shutdown::shutdown_channel();

        Ok(Self {
            queues: Mutex::new(PriorityQueues::new(config.max_queue_size)),
            in_flight: Mutex::new(HashMap::new()),
            dead_letters: DeadLetterQueue::new(config.dead_letter_max_size),
            consistency: ConsistencyChecker::new(config.consistency_sample_rate),
            retry_policy: RetryPolicy::new(),
            sync,
            health,
            time_provider,
            id_provider,
            counters: Mutex::new(RecoveryCounters::default()),
            recovery_callbacks: RwLock::new(HashMap::new()),
            last_health: Mutex::new(BTreeMap::new()),
            accepting: AtomicBool::new(true),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
            config,
        })
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Queue an operation for automatic recovery
    ///
    /// Never fails: the returned id is valid even when the request was
    /// dropped (queue full or shutting down), which is logged and counted.
    pub async fn schedule_recovery_operation(&self, request: RecoveryRequest) -> OperationId {
        let id = self.id_provider.generate_id();
        let now = self.time_provider.now_millis();

        let mut op = RecoveryOperation::new(
            id.clone(),
            now,
            request.task,
            request.recovery_type,
            request.failure_category,
            request.priority,
            request.operation_type,
            request.service_type,
        );
        op.context_data = request.context_data;
        op.retry_params = match request.retry_params {
            Some(params) => match params.validate() {
                Ok(()) => params,
                Err(e) => {
                    warn!(operation_id = %id, error = %e, "Invalid retry params, using defaults");
                    self.config.default_retry_params()
                }
            },
            None => self.config.default_retry_params(),
        };
        op.on_success = request.on_success;
        op.on_failure = request.on_failure;

        if !self.is_accepting() {
            warn!(operation_id = %id, "Recovery system shutting down, operation dropped");
            self.counters.lock().await.dropped += 1;
            return id;
        }

        self.counters
            .lock()
            .await
            .for_type(op.recovery_type)
            .scheduled += 1;

        if op.recovery_type.bypasses_queue() {
            info!(
                operation_id = %id,
                recovery_type = %op.recovery_type,
                "Operation routed straight to dead letter queue"
            );
            self.park_in_dead_letter(op, MANUAL_INTERVENTION_ERROR.to_string())
                .await;
            return id;
        }

        if op.recovery_type == RecoveryType::DelayedRetry {
            let delay_ms = self.retry_policy.compute_delay(0, &op.retry_params);
            op.next_retry_at = Some(now.saturating_add(delay_ms));
        }

        let priority = op.priority;
        let pushed = self.queues.lock().await.push(op);
        match pushed {
            Ok(()) => {
                info!(
                    operation_id = %id,
                    recovery_type = %request.recovery_type,
                    priority = %priority,
                    service = %request.service_type,
                    "Recovery operation scheduled"
                );
            }
            Err(_) => {
                warn!(
                    operation_id = %id,
                    priority = %priority,
                    max_queue_size = self.config.max_queue_size,
                    "Recovery queue full, operation dropped"
                );
                self.counters.lock().await.dropped += 1;
            }
        }

        id
    }

    /// Create a pending sync job
    pub async fn schedule_background_sync(&self, request: SyncRequest) -> SyncJobId {
        let id = self.id_provider.generate_id();
        let mut job = SyncJob::new(
            id.clone(),
            self.time_provider.now_millis(),
            request.service_type,
            request.sync_type,
            request.priority,
        );
        job.source_keys = request.source_keys;
        job.target_keys = request.target_keys;
        job.data_items = request.data_items;
        job.scheduled_at = request.scheduled_at;

        info!(
            job_id = %id,
            service = %request.service_type,
            sync_type = %request.sync_type,
            priority = %request.priority,
            "Background sync scheduled"
        );
        self.sync.insert(job).await;
        id
    }

    pub async fn get_sync_job(&self, job_id: &str) -> Option<SyncJob> {
        self.sync.get(job_id).await
    }

    pub async fn get_sync_jobs(&self) -> Vec<SyncJob> {
        self.sync.list().await
    }

    pub async fn register_sync_executor(&self, service: ServiceType, executor: Arc<dyn SyncExecutor>) {
        self.sync.register_executor(service, executor).await;
    }

    pub async fn register_service_recovery_callback(
        &self,
        service: ServiceType,
        callback: ServiceRecoveryCallback,
    ) {
        self.recovery_callbacks
            .write()
            .await
            .entry(service)
            .or_default()
            .push(callback);
    }

    pub async fn get_dead_letter_items(&self, limit: usize) -> Vec<DeadLetterItem> {
        self.dead_letters.get(limit).await
    }

    /// Move a dead-lettered operation back into its queue with a fresh budget
    ///
    /// Returns false if the id is unknown, the system is shutting down, or
    /// the target bucket is full (the item then stays dead-lettered).
    pub async fn retry_dead_letter_item(&self, operation_id: &str) -> bool {
        if !self.is_accepting() {
            return false;
        }
        let Some(item) = self.dead_letters.remove(operation_id).await else {
            debug!(operation_id = %operation_id, "Dead letter item not found");
            return false;
        };

        let mut op = item.operation.clone();
        if let Err(e) = op.reset_for_retry() {
            error!(operation_id = %operation_id, error = %e, "Cannot reset dead letter item");
            self.dead_letters.add(item).await;
            return false;
        }

        let pushed = self.queues.lock().await.push(op);
        match pushed {
            Ok(()) => {
                info!(operation_id = %operation_id, "Dead letter item re-queued");
                true
            }
            Err(_) => {
                warn!(operation_id = %operation_id, "Recovery queue full, item stays dead-lettered");
                self.dead_letters.add(item).await;
                false
            }
        }
    }

    pub async fn is_queued(&self, operation_id: &str) -> bool {
        self.queues.lock().await.contains(operation_id)
    }

    pub async fn get_recovery_status(&self) -> RecoveryStatus {
        let queue_lengths = self.queues.lock().await.lengths();
        let (recovery_stats, dropped_operations, consistency_failures) = {
            let counters = self.counters.lock().await;
            (
                counters.by_type.clone(),
                counters.dropped,
                counters.consistency_failures,
            )
        };

        RecoveryStatus {
            accepting_work: self.is_accepting(),
            queue_lengths,
            recovery_stats,
            dropped_operations,
            consistency_failures,
            sync_jobs: self.sync.counts().await,
            dead_letter: self.dead_letters.stats().await,
            service_health: self.last_health.lock().await.clone(),
        }
    }

    /// One recovery worker iteration, returning how many operations ran
    pub async fn process_recovery_cycle(&self) -> usize {
        let now = self.time_provider.now_millis();
        let batch = self
            .queues
            .lock()
            .await
            .take_ready_batch(now, self.config.worker_batch_size);

        if batch.is_empty() {
            return 0;
        }

        let count = batch.len();
        debug!(batch_size = count, "Processing recovery batch");
        {
            let mut in_flight = self.in_flight.lock().await;
            for op in &batch {
                in_flight.insert(op.id.clone(), op.clone());
            }
        }
        join_all(batch.into_iter().map(|op| async move {
            let id = op.id.clone();
            self.execute_operation(op).await;
            self.in_flight.lock().await.remove(&id);
        }))
        .await;
        count
    }

    /// One sync worker iteration, returning how many jobs ran
    pub async fn process_sync_cycle(&self) -> usize {
        self.sync.process_cycle().await
    }

    /// One health monitor iteration, returning the services that just recovered
    ///
    /// The first observation of a service only sets its baseline.
    pub async fn check_service_health(&self) -> Vec<ServiceType> {
        let mut recovered = Vec::new();

        for service in ServiceType::ALL {
            let available = self.health.is_available(service).await;
            let previous = self.last_health.lock().await.insert(service, available);

            match (previous, available) {
                (Some(false), true) => recovered.push(service),
                (Some(true), false) => warn!(service = %service, "Service became unavailable"),
                _ => {}
            }
        }

        for service in &recovered {
            self.handle_service_recovery(*service).await;
        }
        recovered
    }

    async fn handle_service_recovery(&self, service: ServiceType) {
        info!(service = %service, "Service recovered");

        let callbacks = self
            .recovery_callbacks
            .read()
            .await
            .get(&service)
            .cloned()
            .unwrap_or_default();
        for callback in callbacks {
            guard::invoke_guarded("service_recovery", || callback(service));
        }

        self.schedule_background_sync(
            SyncRequest::new(service, SyncType::IncrementalSync).with_priority(RecoveryPriority::High),
        )
        .await;
    }

    /// Attempt one operation and route it by outcome
    ///
    /// Returns the terminal result, or None when a retry was scheduled.
    async fn execute_operation(&self, mut op: RecoveryOperation) -> Option<RecoveryResult> {
        let started = Instant::now();
        if let Err(e) = op.begin_attempt(self.time_provider.now_millis()) {
            error!(operation_id = %op.id, error = %e, "Operation not attemptable, dropped");
            return None;
        }
        self.counters
            .lock()
            .await
            .for_type(op.recovery_type)
            .attempts += 1;

        let outcome = if self.health.is_available(op.service_type).await {
            match tokio::time::timeout(
                self.config.operation_timeout(),
                guard::execute_task_guarded(Arc::clone(&op.task)),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ServiceError::Timeout(self.config.operation_timeout_ms)),
            }
        } else {
            Err(ServiceError::Unavailable(op.service_type.to_string()))
        };

        match outcome {
            Ok(value) => Some(self.complete_success(op, value, started).await),
            Err(e) => self.handle_failure(op, e, started).await,
        }
    }

    async fn complete_success(
        &self,
        mut op: RecoveryOperation,
        value: serde_json::Value,
        started: Instant,
    ) -> RecoveryResult {
        if let Err(e) = op.succeed() {
            error!(operation_id = %op.id, error = %e, "Invalid success transition");
        }

        let consistency = self.consistency.sample(op.operation_type, &value);
        {
            let mut counters = self.counters.lock().await;
            counters.for_type(op.recovery_type).succeeded += 1;
            if consistency == Some(false) {
                counters.consistency_failures += 1;
            }
        }

        let result = RecoveryResult {
            operation_id: op.id.clone(),
            success: true,
            attempts_made: op.retry_count,
            elapsed_ms: started.elapsed().as_millis() as i64,
            final_error: None,
            consistency_check_passed: consistency,
            value: Some(value),
        };

        info!(
            operation_id = %op.id,
            attempts = op.retry_count,
            consistency = ?consistency,
            "Recovery operation succeeded"
        );

        if let Some(callback) = &op.on_success {
            guard::invoke_guarded("on_success", || callback(&result));
        }
        result
    }

    async fn handle_failure(
        &self,
        mut op: RecoveryOperation,
        err: ServiceError,
        started: Instant,
    ) -> Option<RecoveryResult> {
        let now = self.time_provider.now_millis();
        let message = err.to_string();
        op.record_failure(message.clone(), now);
        self.counters
            .lock()
            .await
            .for_type(op.recovery_type)
            .failed_attempts += 1;

        warn!(
            operation_id = %op.id,
            attempt = op.retry_count,
            timed_out = err.is_timeout(),
            error = %message,
            "Recovery attempt failed"
        );

        match self.retry_policy.decide(&op) {
            RetryDecision::DeadLetter => Some(self.dead_letter_exhausted(op, message, started).await),
            RetryDecision::Retry(delay_ms) => {
                let retry_at = now.saturating_add(delay_ms);
                if let Err(e) = op.schedule_retry(retry_at).and_then(|_| op.requeue()) {
                    error!(operation_id = %op.id, error = %e, "Invalid retry transition");
                    return Some(self.dead_letter_exhausted(op, message, started).await);
                }

                let recovery_type = op.recovery_type;
                let pushed = self.queues.lock().await.push(op);
                match pushed {
                    Ok(()) => {
                        self.counters
                            .lock()
                            .await
                            .for_type(recovery_type)
                            .retries_scheduled += 1;
                        None
                    }
                    Err(op) => {
                        warn!(operation_id = %op.id, "Recovery queue full on retry");
                        Some(
                            self.dead_letter_exhausted(op, QUEUE_FULL_ERROR.to_string(), started)
                                .await,
                        )
                    }
                }
            }
        }
    }

    /// Dead-letter an operation that ran and failed, notifying its failure callback
    async fn dead_letter_exhausted(
        &self,
        op: RecoveryOperation,
        final_error: String,
        started: Instant,
    ) -> RecoveryResult {
        let result = RecoveryResult {
            operation_id: op.id.clone(),
            success: false,
            attempts_made: op.retry_count,
            elapsed_ms: started.elapsed().as_millis() as i64,
            final_error: Some(final_error.clone()),
            consistency_check_passed: None,
            value: None,
        };

        if let Some(callback) = &op.on_failure {
            guard::invoke_guarded("on_failure", || callback(&result));
        }

        self.park_in_dead_letter(op, final_error).await;
        result
    }

    async fn park_in_dead_letter(&self, mut op: RecoveryOperation, final_error: String) {
        if let Err(e) = op.dead_letter() {
            error!(operation_id = %op.id, error = %e, "Invalid dead letter transition");
            return;
        }

        warn!(
            operation_id = %op.id,
            attempts = op.retry_count,
            final_error = %final_error,
            "Operation moved to dead letter queue"
        );

        self.counters
            .lock()
            .await
            .for_type(op.recovery_type)
            .dead_lettered += 1;

        let item = DeadLetterItem {
            retry_attempts_made: op.retry_count,
            dead_lettered_at: self.time_provider.now_millis(),
            final_error,
            operation: op,
        };
        self.dead_letters.add(item).await;
    }

    /// Spawn the recovery worker, sync worker and health monitor loops
    pub async fn start(self: &Arc<Self>) {
        if !self.is_accepting() {
            warn!("Recovery system already shut down, not starting");
            return;
        }

        let mut handles = self.handles.lock().await;
        if !handles.is_empty() {
            warn!("Recovery system already started");
            return;
        }

        handles.push(tokio::spawn(
            Arc::clone(self).run_recovery_worker(self.shutdown_tx.subscribe()),
        ));
        handles.push(tokio::spawn(
            Arc::clone(self).run_sync_worker(self.shutdown_tx.subscribe()),
        ));
        handles.push(tokio::spawn(
            Arc::clone(self).run_health_monitor(self.shutdown_tx.subscribe()),
        ));

        info!(
            recovery_interval_ms = self.config.recovery_interval_ms,
            sync_interval_ms = self.config.sync_interval_ms,
            health_check_interval_ms = self.config.health_check_interval_ms,
            "Error recovery system started"
        );
    }

    async fn run_recovery_worker(self: Arc<Self>, mut shutdown: ShutdownToken) {
        info!("Recovery worker started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            self.process_recovery_cycle().await;
            if shutdown
                .sleep_or_shutdown(self.config.recovery_interval())
                .await
            {
                break;
            }
        }
        info!("Recovery worker stopped");
    }

    async fn run_sync_worker(self: Arc<Self>, mut shutdown: ShutdownToken) {
        info!("Sync worker started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            self.process_sync_cycle().await;
            if shutdown.sleep_or_shutdown(self.config.sync_interval()).await {
                break;
            }
        }
        info!("Sync worker stopped");
    }

    async fn run_health_monitor(self: Arc<Self>, mut shutdown: ShutdownToken) {
        info!("Health monitor started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            self.check_service_health().await;
            if shutdown
                .sleep_or_shutdown(self.config.health_check_interval())
                .await
            {
                break;
            }
        }
        info!("Health monitor stopped");
    }

    /// Put operations cut off mid-attempt back where they were taken from
    ///
    /// An operation that cannot be re-queued is dead-lettered so it stays
    /// visible. Ids already queued or dead-lettered were routed before the
    /// abort and are skipped.
    async fn restore_in_flight(&self) -> usize {
        let interrupted: Vec<_> = self.in_flight.lock().await.drain().map(|(_, op)| op).collect();
        let mut restored = 0;

        for op in interrupted {
            let queued = self.queues.lock().await.contains(&op.id);
            if queued || self.dead_letters.contains(&op.id).await {
                continue;
            }
            warn!(
                operation_id = %op.id,
                priority = %op.priority,
                "Operation interrupted by shutdown, re-queued"
            );
            let pushed = self.queues.lock().await.push(op);
            if let Err(op) = pushed {
                self.park_in_dead_letter(op, QUEUE_FULL_ERROR.to_string()).await;
            }
            restored += 1;
        }
        restored
    }

    /// Stop accepting work, stop the loops, then drain urgent operations
    ///
    /// Operations interrupted when a loop is aborted are re-queued first.
    /// Up to `shutdown_drain_limit` Critical operations then get one final
    /// attempt each, whether or not their retry time has come. Returns how
    /// many ran.
    pub async fn shutdown(&self) -> usize {
        if !self.accepting.swap(false, Ordering::SeqCst) {
            return 0;
        }
        info!("Error recovery system shutting down");
        self.shutdown_tx.shutdown();

        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for mut handle in handles {
            if tokio::time::timeout(LOOP_STOP_TIMEOUT, &mut handle)
                .await
                .is_err()
            {
                warn!("Background loop did not stop in time, aborting");
                handle.abort();
                // Wait until the aborted future is dropped
                let _ = handle.await;
            }
        }

        let restored = self.restore_in_flight().await;
        if restored > 0 {
            info!(restored = restored, "Interrupted operations restored");
        }

        let critical = self
            .queues
            .lock()
            .await
            .take_critical(self.config.shutdown_drain_limit);
        let drained = critical.len();
        for op in critical {
            self.execute_operation(op).await;
        }

        info!(drained = drained, "Error recovery system stopped");
        drained
    }
}
