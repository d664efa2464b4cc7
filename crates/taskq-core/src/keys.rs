//! Store keyspace.
//!
//! | key                       | type       | purpose          |
//! |---------------------------|------------|------------------|
//! | `{ns}:queue`              | sorted set | schedule         |
//! | `{ns}:data:{id}`          | string     | durable record   |
//! | `{ns}:processing:{id}`    | string     | in-flight record |
//! | `{ns}:lock:{id}`          | string     | lease            |
//!
//! The default namespace is `task`. Ids are embedded as bare ULIDs.

use crate::domain::TaskId;

pub const DEFAULT_NAMESPACE: &str = "task";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    ns: String,
}

impl Keyspace {
    pub fn new(ns: impl Into<String>) -> Self {
        Self { ns: ns.into() }
    }

    pub fn namespace(&self) -> &str {
        &self.ns
    }

    pub fn queue(&self) -> String {
        format!("{}:queue", self.ns)
    }

    pub fn data(&self, id: TaskId) -> String {
        format!("{}:data:{}", self.ns, id.key_part())
    }

    pub fn processing(&self, id: TaskId) -> String {
        format!("{}:processing:{}", self.ns, id.key_part())
    }

    pub fn lock(&self, id: TaskId) -> String {
        format!("{}:lock:{}", self.ns, id.key_part())
    }

    pub fn processing_pattern(&self) -> String {
        format!("{}:processing:*", self.ns)
    }

    /// Inverse of [`Keyspace::processing`].
    pub fn task_id_from_processing(&self, key: &str) -> Option<TaskId> {
        key.strip_prefix(&self.ns)?
            .strip_prefix(":processing:")?
            .parse()
            .ok()
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}
