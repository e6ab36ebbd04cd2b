pub mod backend;
pub mod dispatcher;

pub use backend::{build_push_request, AlertBackend, LineBackend, LineMessage, LogBackend, PushRequest};
pub use dispatcher::{compose_message, snapshot_file_name, AlertDispatcher, AlertJob, AlertQueue, DispatcherConfig};

use crate::tracking::EntityId;

/// 転倒通知の受け口
///
/// 呼び出し側をブロックしない。受理してキューに積んだ場合のみtrue。
pub trait AlertSink: Send + Sync {
    fn notify(&self, entity_id: EntityId, snapshot: Vec<u8>, risk_score: f32) -> bool;
}

/// 通知を無効化した場合の受け口
pub struct NullSink;

impl AlertSink for NullSink {
    fn notify(&self, _entity_id: EntityId, _snapshot: Vec<u8>, _risk_score: f32) -> bool {
        false
    }
}
