//! Queue engine: enqueue, claim, complete, fail-and-retry, lookup.
//!
//! The engine composes three pieces that all live in the shared store:
//! - the schedule (ids ordered by due time),
//! - the lease manager (one exclusive, expiring claim per id),
//! - the task records (durable record + in-flight record).
//!
//! It never holds in-process state about other workers. Every step below
//! is a single store round-trip, so the only moment a task is both
//! scheduled and leased is between the lease grant and the schedule
//! removal inside `claim`.

mod records;
mod retry;
mod stats;

pub use retry::RetryPolicy;
pub use stats::QueueStats;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::codec::{JsonCodec, TaskCodec};
use crate::config::EngineConfig;
use crate::domain::{Payload, Task, TaskId, WorkerId};
use crate::error::QueueError;
use crate::impls::{StoreLeases, StoreSchedule};
use crate::keys::Keyspace;
use crate::ports::clock::to_chrono;
use crate::ports::{
    Clock, IdGenerator, KeyValueStore, LeaseManager, Schedule, SystemClock, UlidGenerator,
};
use records::TaskRecords;

/// Lease owner used by the reaper while it moves a task back to the schedule.
const REAPER_OWNER: &str = "reaper";

pub struct QueueEngine {
    schedule: Arc<dyn Schedule>,
    leases: Arc<dyn LeaseManager>,
    records: TaskRecords,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: EngineConfig,
}

impl QueueEngine {
    /// Engine over `store` with the system clock and the JSON codec.
    pub fn new(store: Arc<dyn KeyValueStore>, config: EngineConfig) -> Self {
        Self::builder(store).config(config).build()
    }

    pub fn builder(store: Arc<dyn KeyValueStore>) -> EngineBuilder {
        EngineBuilder::new(store)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// A fresh PENDING task due now, with an id from the engine's generator.
    pub fn new_task(&self, task_type: impl Into<String>, payload: Payload) -> Task {
        Task::new(self.ids.task_id(), task_type, payload, self.clock.now())
    }

    /// Write the task record and (re)insert the id into the schedule at
    /// `scheduled_at`. Last write wins on the record; the schedule entry is
    /// moved, never duplicated.
    pub async fn enqueue(&self, task: &Task) -> Result<TaskId, QueueError> {
        self.records.save_data(task, self.config.record_ttl).await?;
        self.schedule.insert(task.id, task.due_millis()).await?;
        debug!(task_id = %task.id, status = %task.status, scheduled_at = %task.scheduled_at, "enqueued");
        Ok(task.id)
    }

    /// Claim the earliest scheduled task for `worker_id`.
    ///
    /// `Ok(None)` means nothing to do this tick: the schedule is empty, its
    /// head is not due yet (when `respect_due_time` is set), another worker
    /// won the lease or already took the task off the schedule, or the
    /// record is missing or no longer PENDING/RETRYING.
    pub async fn claim(&self, worker_id: &WorkerId) -> Result<Option<Task>, QueueError> {
        let Some(head) = self.schedule.peek_earliest().await? else {
            return Ok(None);
        };
        let task_id = head.task_id;

        if self.config.respect_due_time && head.due_millis > self.clock.now().timestamp_millis() {
            return Ok(None);
        }

        if !self
            .leases
            .try_acquire(task_id, worker_id, self.config.lease_ttl)
            .await?
        {
            // 他のワーカーが先に取った。次の tick でまた覗く
            debug!(%task_id, %worker_id, "lost lease race");
            return Ok(None);
        }

        // peek が古かった: 別のワーカーが claim して既に lease を返している
        if !self.schedule.remove(task_id).await? {
            debug!(%task_id, %worker_id, "task left the schedule after peek");
            self.leases.release(task_id).await?;
            return Ok(None);
        }

        let Some(mut task) = self.records.load_data(task_id).await? else {
            warn!(%task_id, %worker_id, "scheduled task has no record; dropping");
            self.leases.release(task_id).await?;
            return Ok(None);
        };

        if !task.status.is_schedulable() {
            warn!(%task_id, %worker_id, status = %task.status, "scheduled task is not claimable; dropping");
            self.leases.release(task_id).await?;
            return Ok(None);
        }

        // re-enqueue された retry は新しい due time まで待たせる
        if self.config.respect_due_time && task.due_millis() > self.clock.now().timestamp_millis() {
            self.schedule.insert(task_id, task.due_millis()).await?;
            self.leases.release(task_id).await?;
            return Ok(None);
        }

        task.mark_processing(worker_id.clone());
        self.records
            .save_processing(&task, self.config.processing_ttl)
            .await?;

        info!(%task_id, %worker_id, task_type = %task.task_type, retry_count = task.retry_count, "task claimed");
        Ok(Some(task))
    }

    /// Mark a claimed task COMPLETED. Safe to call more than once.
    pub async fn complete(&self, task_id: TaskId) -> Result<(), QueueError> {
        match self.records.load_processing(task_id).await? {
            Some(mut task) => {
                task.mark_completed(self.clock.now());
                self.records
                    .save_data(&task, self.config.terminal_ttl)
                    .await?;
                self.records.delete_processing(task_id).await?;
                info!(%task_id, "task completed");
            }
            None => debug!(%task_id, "complete: no in-flight record, already handled"),
        }
        self.leases.release(task_id).await?;
        Ok(())
    }

    /// Record a failed attempt: re-schedule with backoff while retries
    /// remain, otherwise mark FAILED. Safe to call for an id that is no
    /// longer in flight (no-op apart from releasing the lease).
    pub async fn fail(&self, task_id: TaskId, error_message: &str) -> Result<(), QueueError> {
        match self.records.load_processing(task_id).await? {
            Some(mut task) => {
                task.record_failure(error_message);
                let now = self.clock.now();

                if task.can_retry() {
                    let backoff = self.config.retry.next_delay(task.retry_count);
                    task.schedule_retry(add_delay(now, backoff));
                    self.enqueue(&task).await?;
                    info!(
                        %task_id,
                        retry_count = task.retry_count,
                        max_retries = task.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = error_message,
                        "task failed, retry scheduled"
                    );
                } else {
                    task.mark_failed(now);
                    self.records
                        .save_data(&task, self.config.terminal_ttl)
                        .await?;
                    warn!(
                        %task_id,
                        retry_count = task.retry_count,
                        error = error_message,
                        "task failed permanently"
                    );
                }
                self.records.delete_processing(task_id).await?;
            }
            None => debug!(%task_id, "fail: no in-flight record, already handled"),
        }
        self.leases.release(task_id).await?;
        Ok(())
    }

    /// Durable record first, then the in-flight record.
    pub async fn get_task(&self, task_id: TaskId) -> Result<Option<Task>, QueueError> {
        if let Some(task) = self.records.load_data(task_id).await? {
            return Ok(Some(task));
        }
        self.records.load_processing(task_id).await
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let pending_tasks = self.schedule.size().await?;
        let processing_tasks = self.records.count_processing().await?;
        Ok(QueueStats {
            pending_tasks,
            processing_tasks,
        })
    }

    /// Who holds the lease on `task_id` right now.
    pub async fn lease_holder(&self, task_id: TaskId) -> Result<Option<WorkerId>, QueueError> {
        Ok(self.leases.holder(task_id).await?)
    }

    /// Move in-flight tasks whose lease has expired back to the schedule.
    ///
    /// A worker that dies after claiming leaves only its in-flight record
    /// behind. For each such record with no live lease, the reaper takes
    /// the lease itself, re-enqueues the task as PENDING and drops the
    /// in-flight record. A reclaim does not consume a retry.
    pub async fn reap_expired_leases(&self) -> Result<Vec<TaskId>, QueueError> {
        let reaper = WorkerId::new(REAPER_OWNER);
        let mut reclaimed = Vec::new();

        for task_id in self.records.processing_ids().await? {
            if !self
                .leases
                .try_acquire(task_id, &reaper, self.config.lease_ttl)
                .await?
            {
                continue;
            }

            // lease を取ってから読み直す（その間に complete/fail された可能性がある）
            if let Some(mut task) = self.records.load_processing(task_id).await? {
                let previous_worker = task.worker_id.clone();
                task.reclaim(self.clock.now());
                self.enqueue(&task).await?;
                self.records.delete_processing(task_id).await?;
                info!(
                    %task_id,
                    previous_worker = previous_worker.as_ref().map(WorkerId::as_str).unwrap_or("-"),
                    "expired lease reclaimed"
                );
                reclaimed.push(task_id);
            }
            self.leases.release(task_id).await?;
        }

        Ok(reclaimed)
    }
}

fn add_delay(now: DateTime<Utc>, delay: std::time::Duration) -> DateTime<Utc> {
    now.checked_add_signed(to_chrono(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Builder for [`QueueEngine`]. Everything but the store has a default.
pub struct EngineBuilder {
    store: Arc<dyn KeyValueStore>,
    config: EngineConfig,
    clock: Option<Arc<dyn Clock>>,
    codec: Option<Arc<dyn TaskCodec>>,
    ids: Option<Arc<dyn IdGenerator>>,
    schedule: Option<Arc<dyn Schedule>>,
    leases: Option<Arc<dyn LeaseManager>>,
}

impl EngineBuilder {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
            clock: None,
            codec: None,
            ids: None,
            schedule: None,
            leases: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn codec(mut self, codec: Arc<dyn TaskCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Replace the store-backed schedule.
    pub fn schedule(mut self, schedule: Arc<dyn Schedule>) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Replace the store-backed lease manager.
    pub fn leases(mut self, leases: Arc<dyn LeaseManager>) -> Self {
        self.leases = Some(leases);
        self
    }

    pub fn build(self) -> QueueEngine {
        let keys = Keyspace::new(self.config.namespace.clone());
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let codec = self.codec.unwrap_or_else(|| Arc::new(JsonCodec));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));
        let schedule = self
            .schedule
            .unwrap_or_else(|| Arc::new(StoreSchedule::new(self.store.clone(), &keys)));
        let leases = self
            .leases
            .unwrap_or_else(|| Arc::new(StoreLeases::new(self.store.clone(), keys.clone())));

        QueueEngine {
            schedule,
            leases,
            records: TaskRecords::new(self.store, codec, keys),
            clock,
            ids,
            config: self.config,
        }
    }
}
