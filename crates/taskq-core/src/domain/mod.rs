//! Domain model (IDs, task record, status).
//!
//! ここにはストアやワーカーの知識を持ち込まない。
//! 状態遷移のルールだけを表現する。

pub mod ids;
pub mod status;
pub mod task;

pub use ids::{Id, IdMarker, ParseIdError, TaskId, WorkerId};
pub use status::TaskStatus;
pub use task::{DEFAULT_MAX_RETRIES, Payload, Task};
