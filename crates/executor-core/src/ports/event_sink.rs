//! EventSink port - ライフサイクルイベントの通知
//!
//! `emit` is called inside the dispatcher's critical section, so it must
//! never block: fire-and-forget.

use crate::domain::TaskEvent;

pub trait EventSink: Send + Sync {
    fn emit(&self, event: TaskEvent);
}
