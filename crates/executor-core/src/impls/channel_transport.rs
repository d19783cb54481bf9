//! ChannelTransport - プロセス内ワーカーへの配送
//!
//! # 実装詳細
//! - worker_id ごとに tokio mpsc channel を持つ
//! - `connect` が Receiver を返し、ワーカー側はそれを読み続ける
//! - Receiver が drop されると deliver は Disconnected を返す

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{TaskId, WorkerId};
use crate::ports::{Delivery, Transport, TransportError};

/// What an in-process worker reads from its channel.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    Task(Delivery),
    Cancel(TaskId),
}

type Senders = HashMap<WorkerId, mpsc::UnboundedSender<WorkerMessage>>;

#[derive(Debug, Clone, Default)]
pub struct ChannelTransport {
    senders: Arc<Mutex<Senders>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or replace) the channel for `worker_id`.
    pub fn connect(&self, worker_id: WorkerId) -> mpsc::UnboundedReceiver<WorkerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(worker_id, tx);
        rx
    }

    pub fn disconnect(&self, worker_id: &WorkerId) {
        self.lock().remove(worker_id);
    }

    pub fn is_connected(&self, worker_id: &WorkerId) -> bool {
        self.lock().get(worker_id).is_some_and(|tx| !tx.is_closed())
    }

    fn lock(&self) -> MutexGuard<'_, Senders> {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, worker_id: &WorkerId, message: WorkerMessage) -> Result<(), TransportError> {
        let tx = self
            .lock()
            .get(worker_id)
            .cloned()
            .ok_or_else(|| TransportError::Disconnected(worker_id.clone()))?;
        tx.send(message)
            .map_err(|_| TransportError::Disconnected(worker_id.clone()))
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn deliver(
        &self,
        worker_id: &WorkerId,
        delivery: &Delivery,
    ) -> Result<(), TransportError> {
        self.send(worker_id, WorkerMessage::Task(delivery.clone()))
    }

    async fn cancel(&self, worker_id: &WorkerId, task_id: &TaskId) -> Result<(), TransportError> {
        self.send(worker_id, WorkerMessage::Cancel(task_id.clone()))
    }
}
