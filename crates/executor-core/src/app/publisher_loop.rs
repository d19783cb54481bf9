//! PublisherLoop - ライフサイクルイベントの配送
//!
//! # フロー
//! 1. ChannelEventSink の受信側から TaskEvent を取り出す
//! 2. 登録された EventSubscriber 全員に順番に渡す
//! 3. shutdown 時はバッファに残ったイベントを配り切ってから終了
//!
//! Subscribers run here, outside the dispatcher's lock, so they may await.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::TaskEvent;

/// Downstream consumer of task events (monitoring, accounting, ...).
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn on_event(&self, event: &TaskEvent);
}

/// Writes every event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSubscriber;

#[async_trait]
impl EventSubscriber for LoggingSubscriber {
    async fn on_event(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Failed {
                task_id,
                stage,
                retry_count,
                reasons,
            } => warn!(
                %task_id,
                %stage,
                retry_count,
                last_reason = reasons.last().map(String::as_str),
                "task failed"
            ),
            TaskEvent::Done {
                task_id,
                stage,
                result_code,
            } => info!(%task_id, %stage, %result_code, "task done"),
            other => info!(task_id = %other.task_id(), event = other.name(), "task event"),
        }
    }
}

pub struct PublisherLoop {
    events: mpsc::UnboundedReceiver<TaskEvent>,
    subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl PublisherLoop {
    pub fn new(events: mpsc::UnboundedReceiver<TaskEvent>) -> Self {
        Self {
            events,
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Runs until every sender is gone or `shutdown` is cancelled.
    /// Returns the number of events published.
    pub async fn run(mut self, shutdown: CancellationToken) -> usize {
        let mut published = 0;
        loop {
            let event = tokio::select! {
                event = self.events.recv() => event,
                _ = shutdown.cancelled() => break,
            };
            let Some(event) = event else {
                return published;
            };
            self.publish(&event).await;
            published += 1;
        }

        while let Ok(event) = self.events.try_recv() {
            self.publish(&event).await;
            published += 1;
        }
        published
    }

    async fn publish(&self, event: &TaskEvent) {
        for subscriber in &self.subscribers {
            subscriber.on_event(event).await;
        }
    }
}
