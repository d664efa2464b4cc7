//! Task record: the unit of work and its lifecycle bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{TaskId, WorkerId};
use super::status::TaskStatus;

/// Default retry ceiling for a new task.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Opaque task payload: string keys, dynamically-typed values.
///
/// The engine never looks inside; handlers decode it however they like.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// A task as stored in the durable record and the processing record.
///
/// Design:
/// - This is the "single source of truth" for task status.
/// - The schedule and the lease hold the task id only.
/// - All status transitions happen through the methods below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    /// Selects the handler. Opaque to the engine.
    #[serde(rename = "type")]
    pub task_type: String,

    #[serde(default)]
    pub payload: Payload,

    pub status: TaskStatus,

    pub created_at: DateTime<Utc>,

    /// Earliest time the task is eligible to run. Moved forward on every retry.
    pub scheduled_at: DateTime<Utc>,

    /// Set once, when the task reaches a terminal status.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    pub retry_count: u32,

    pub max_retries: u32,

    /// Worker currently (or last) holding the task.
    #[serde(default)]
    pub worker_id: Option<WorkerId>,

    /// Last failure reason.
    #[serde(default)]
    pub error_message: Option<String>,
}

impl Task {
    pub fn new(
        id: TaskId,
        task_type: impl Into<String>,
        payload: Payload,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            task_type: task_type.into(),
            payload,
            status: TaskStatus::Pending,
            created_at: now,
            scheduled_at: now,
            completed_at: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            worker_id: None,
            error_message: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay the first run.
    pub fn with_scheduled_at(mut self, scheduled_at: DateTime<Utc>) -> Self {
        self.scheduled_at = scheduled_at;
        self
    }

    /// Schedule score (epoch millis).
    pub fn due_millis(&self) -> i64 {
        self.scheduled_at.timestamp_millis()
    }

    /// Mark as claimed by `worker_id`.
    pub fn mark_processing(&mut self, worker_id: WorkerId) {
        self.status = TaskStatus::Processing;
        self.worker_id = Some(worker_id);
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(now);
    }

    /// Count one failed attempt. `retry_count` never passes `max_retries`.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.retry_count = (self.retry_count + 1).min(self.max_retries);
        self.error_message = Some(error.into());
    }

    /// Whether another attempt is still allowed after the failures recorded so far.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Schedule retry with backoff.
    pub fn schedule_retry(&mut self, next_run_at: DateTime<Utc>) {
        self.status = TaskStatus::Retrying;
        self.scheduled_at = next_run_at;
    }

    /// Mark as failed (retries exhausted).
    pub fn mark_failed(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(now);
    }

    /// Put a task whose lease expired back into the pending pool.
    /// Does not count as a failure.
    pub fn reclaim(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Pending;
        self.scheduled_at = self.scheduled_at.max(now);
    }
}
