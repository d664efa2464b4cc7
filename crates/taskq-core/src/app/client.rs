//! TaskClient - 投入側の薄いファサード
//!
//! Producers only need submit + status lookups; they never claim.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{Payload, Task, TaskId};
use crate::engine::{QueueEngine, QueueStats};
use crate::error::QueueError;

/// Acknowledgement returned to the producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub task_id: TaskId,
    pub status: String,
}

/// Per-submission overrides.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub max_retries: Option<u32>,

    /// Run no earlier than this.
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct TaskClient {
    engine: Arc<QueueEngine>,
}

impl TaskClient {
    pub fn new(engine: Arc<QueueEngine>) -> Self {
        Self { engine }
    }

    /// Submit a task due now with the default retry ceiling.
    pub async fn submit(
        &self,
        task_type: impl Into<String>,
        payload: Payload,
    ) -> Result<SubmitReceipt, QueueError> {
        self.submit_with(task_type, payload, SubmitOptions::default())
            .await
    }

    pub async fn submit_with(
        &self,
        task_type: impl Into<String>,
        payload: Payload,
        options: SubmitOptions,
    ) -> Result<SubmitReceipt, QueueError> {
        let mut task: Task = self.engine.new_task(task_type, payload);
        if let Some(max_retries) = options.max_retries {
            task = task.with_max_retries(max_retries);
        }
        if let Some(at) = options.scheduled_at {
            task = task.with_scheduled_at(at);
        }

        let task_id = self.engine.enqueue(&task).await?;
        info!(%task_id, task_type = %task.task_type, "task submitted");
        Ok(SubmitReceipt {
            task_id,
            status: "enqueued".to_string(),
        })
    }

    pub async fn status(&self, task_id: TaskId) -> Result<Option<Task>, QueueError> {
        self.engine.get_task(task_id).await
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        self.engine.stats().await
    }
}
