//! TaskCodec - Task とストアの文字列表現の相互変換
//!
//! デフォルトは JSON（camelCase フィールド、RFC 3339 タイムスタンプ）。
//! encode してから decode すると全フィールドがそのまま戻る。

use crate::domain::Task;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode task: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode task record: {0}")]
    Decode(#[source] serde_json::Error),
}

pub trait TaskCodec: Send + Sync {
    fn encode(&self, task: &Task) -> Result<String, CodecError>;

    fn decode(&self, raw: &str) -> Result<Task, CodecError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl TaskCodec for JsonCodec {
    fn encode(&self, task: &Task) -> Result<String, CodecError> {
        serde_json::to_string(task).map_err(CodecError::Encode)
    }

    fn decode(&self, raw: &str) -> Result<Task, CodecError> {
        serde_json::from_str(raw).map_err(CodecError::Decode)
    }
}
