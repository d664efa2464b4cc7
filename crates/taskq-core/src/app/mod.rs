//! App - アプリケーション層
//!
//! QueueEngine の上で動くワーカー側・投入側のコンポーネント。
//!
//! # 主要コンポーネント
//! - **Runtime / HandlerRegistry**: task type → handler のディスパッチ
//! - **WorkerLoop / WorkerGroup**: ポーリング実行ループ（claim→handle→complete/fail）
//! - **ReaperLoop**: Lease 期限切れの回収
//! - **TaskClient**: タスク投入と状態参照

pub mod client;
pub mod reaper_loop;
pub mod runtime;
pub mod worker_loop;

pub use self::client::{SubmitOptions, SubmitReceipt, TaskClient};
pub use self::reaper_loop::ReaperLoop;
pub use self::runtime::{HandlerRegistry, Runtime, TaskHandler};
pub use self::worker_loop::{WorkerGroup, WorkerLoop};
