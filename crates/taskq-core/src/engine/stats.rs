use serde::{Deserialize, Serialize};

/// Point-in-time queue counters. The two numbers are read separately and
/// are not consistent with each other; good for dashboards, not decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    /// Entries in the schedule.
    pub pending_tasks: u64,

    /// Live in-flight records.
    pub processing_tasks: u64,
}
