//! EventSink implementations.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::TaskEvent;
use crate::ports::EventSink;

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: TaskEvent) {}
}

/// Forwards events to an unbounded channel (read by `PublisherLoop`).
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<TaskEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: TaskEvent) {
        if let Err(err) = self.tx.send(event) {
            debug!(event = err.0.name(), "event receiver gone, dropping event");
        }
    }
}

/// Keeps every event in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<TaskEvent>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn done_count(&self) -> usize {
        self.count(|e| matches!(e, TaskEvent::Done { .. }))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|e| matches!(e, TaskEvent::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&TaskEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| pred(e))
            .count()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: TaskEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ResultCode, StageName, TaskId};

    fn done(id: &str) -> TaskEvent {
        TaskEvent::Done {
            task_id: TaskId::new(id),
            stage: StageName::new("s"),
            result_code: ResultCode::ok(),
        }
    }

    #[tokio::test]
    async fn channel_sink_forwards_and_survives_closed_receiver() {
        let (sink, mut rx) = ChannelEventSink::new();
        sink.emit(done("t1"));
        assert_eq!(rx.recv().await, Some(done("t1")));

        drop(rx);
        sink.emit(done("t2"));
    }

    #[test]
    fn memory_sink_is_shared_between_clones() {
        let sink = MemoryEventSink::new();
        let other = sink.clone();
        other.emit(done("t1"));
        assert_eq!(sink.events(), vec![done("t1")]);
        assert_eq!(sink.done_count(), 1);
        assert_eq!(sink.failed_count(), 0);
    }
}
