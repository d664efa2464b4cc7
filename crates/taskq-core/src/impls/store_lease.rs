//! StoreLeases - `set_if_absent` + TTL で LeaseManager を実装
//!
//! lock キーの値は owner (worker id)。ttl が切れればストアが勝手に消すので、
//! ワーカーが落ちても lease は自然に解放される。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{TaskId, WorkerId};
use crate::keys::Keyspace;
use crate::ports::{KeyValueStore, LeaseManager, StoreError};

pub struct StoreLeases {
    store: Arc<dyn KeyValueStore>,
    keys: Keyspace,
}

impl StoreLeases {
    pub fn new(store: Arc<dyn KeyValueStore>, keys: Keyspace) -> Self {
        Self { store, keys }
    }
}

#[async_trait]
impl LeaseManager for StoreLeases {
    async fn try_acquire(
        &self,
        task_id: TaskId,
        owner: &WorkerId,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let granted = self
            .store
            .set_if_absent(&self.keys.lock(task_id), owner.as_str(), ttl)
            .await?;
        debug!(%task_id, worker_id = %owner, granted, "lease acquire");
        Ok(granted)
    }

    async fn release(&self, task_id: TaskId) -> Result<(), StoreError> {
        self.store.delete(&self.keys.lock(task_id)).await
    }

    async fn holder(&self, task_id: TaskId) -> Result<Option<WorkerId>, StoreError> {
        Ok(self
            .store
            .get(&self.keys.lock(task_id))
            .await?
            .map(WorkerId::new))
    }
}
