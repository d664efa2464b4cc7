//! StoreSchedule - KeyValueStore のソート済み集合で Schedule を実装
//!
//! member = task id (bare ULID), score = due time (epoch millis)

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::TaskId;
use crate::keys::Keyspace;
use crate::ports::{KeyValueStore, Schedule, ScheduledEntry, StoreError};

pub struct StoreSchedule {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl StoreSchedule {
    pub fn new(store: Arc<dyn KeyValueStore>, keys: &Keyspace) -> Self {
        Self {
            store,
            key: keys.queue(),
        }
    }
}

#[async_trait]
impl Schedule for StoreSchedule {
    async fn insert(&self, task_id: TaskId, due_millis: i64) -> Result<(), StoreError> {
        self.store
            .zadd(&self.key, &task_id.key_part(), due_millis)
            .await?;
        debug!(%task_id, due_millis, "scheduled");
        Ok(())
    }

    async fn peek_earliest(&self) -> Result<Option<ScheduledEntry>, StoreError> {
        let Some((member, score)) = self.store.zrange_first(&self.key).await? else {
            return Ok(None);
        };
        match member.parse::<TaskId>() {
            Ok(task_id) => Ok(Some(ScheduledEntry {
                task_id,
                due_millis: score,
            })),
            Err(e) => {
                // 壊れたメンバーが先頭に居座るとキュー全体が止まるので捨てる
                warn!(member = %member, error = %e, "dropping malformed schedule entry");
                self.store.zrem(&self.key, &member).await?;
                Ok(None)
            }
        }
    }

    async fn remove(&self, task_id: TaskId) -> Result<bool, StoreError> {
        self.store.zrem(&self.key, &task_id.key_part()).await
    }

    async fn size(&self) -> Result<u64, StoreError> {
        self.store.zcard(&self.key).await
    }
}
