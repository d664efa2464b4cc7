//! Task status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task status.
///
/// State transitions:
/// - Pending -> Processing -> Completed
/// - Pending -> Processing -> Retrying -> (re-enqueued, eligible again)
/// - Pending -> Processing -> Failed (when retries are exhausted)
/// - Processing -> Pending (lease expired, reclaimed by the reaper)
///
/// `Retrying` is what a re-enqueued task carries until it is claimed again;
/// for scheduling purposes it behaves exactly like `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Waiting in the schedule.
    Pending,

    /// Claimed by a worker (lease held).
    Processing,

    /// Failed and re-scheduled with backoff.
    Retrying,

    /// Finished successfully.
    Completed,

    /// Failed permanently (retries exhausted).
    Failed,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Can a task in this state sit in the schedule?
    pub fn is_schedulable(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Retrying)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Retrying => "RETRYING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
