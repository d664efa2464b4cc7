//! Task record storage: the durable record and the in-flight record.
//!
//! Both hold the same serialized `Task`; they differ only in key and TTL.
//! A record that fails to decode is logged and read as absent, so one
//! corrupt value cannot stall the pollers.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::codec::TaskCodec;
use crate::domain::{Task, TaskId};
use crate::error::QueueError;
use crate::keys::Keyspace;
use crate::ports::KeyValueStore;

pub(crate) struct TaskRecords {
    store: Arc<dyn KeyValueStore>,
    codec: Arc<dyn TaskCodec>,
    keys: Keyspace,
}

impl TaskRecords {
    pub(crate) fn new(
        store: Arc<dyn KeyValueStore>,
        codec: Arc<dyn TaskCodec>,
        keys: Keyspace,
    ) -> Self {
        Self { store, codec, keys }
    }

    pub(crate) async fn load_data(&self, id: TaskId) -> Result<Option<Task>, QueueError> {
        self.load(&self.keys.data(id)).await
    }

    pub(crate) async fn load_processing(&self, id: TaskId) -> Result<Option<Task>, QueueError> {
        self.load(&self.keys.processing(id)).await
    }

    pub(crate) async fn save_data(&self, task: &Task, ttl: Duration) -> Result<(), QueueError> {
        let raw = self.codec.encode(task)?;
        self.store.set(&self.keys.data(task.id), &raw, ttl).await?;
        Ok(())
    }

    pub(crate) async fn save_processing(
        &self,
        task: &Task,
        ttl: Duration,
    ) -> Result<(), QueueError> {
        let raw = self.codec.encode(task)?;
        self.store
            .set(&self.keys.processing(task.id), &raw, ttl)
            .await?;
        Ok(())
    }

    pub(crate) async fn delete_processing(&self, id: TaskId) -> Result<(), QueueError> {
        self.store.delete(&self.keys.processing(id)).await?;
        Ok(())
    }

    /// Ids of every live in-flight record. Approximate (key scan).
    pub(crate) async fn processing_ids(&self) -> Result<Vec<TaskId>, QueueError> {
        let keys = self
            .store
            .keys_matching(&self.keys.processing_pattern())
            .await?;
        Ok(keys
            .iter()
            .filter_map(|key| self.keys.task_id_from_processing(key))
            .collect())
    }

    pub(crate) async fn count_processing(&self) -> Result<u64, QueueError> {
        let keys = self
            .store
            .keys_matching(&self.keys.processing_pattern())
            .await?;
        Ok(keys.len() as u64)
    }

    async fn load(&self, key: &str) -> Result<Option<Task>, QueueError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match self.codec.decode(&raw) {
            Ok(task) => Ok(Some(task)),
            Err(e) => {
                warn!(key, error = %e, "corrupt task record treated as absent");
                Ok(None)
            }
        }
    }
}
