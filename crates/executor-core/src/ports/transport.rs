//! Transport port - ワーカーへの配送
//!
//! The wire protocol is someone else's problem; the dispatcher only needs to
//! hand a task to a worker and, best effort, ask it to stop. Both calls are
//! made after the engine lock is released.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{StageName, TaskId, WorkerId};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("worker {0} is not connected")]
    Disconnected(WorkerId),

    #[error("send to worker {worker_id} failed: {message}")]
    SendFailed { worker_id: WorkerId, message: String },
}

/// What a worker receives for one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub task_id: TaskId,
    pub stage: StageName,
    pub payload: serde_json::Value,
    /// 1-based dispatch attempt for the current stage visit.
    pub attempt: u32,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, worker_id: &WorkerId, delivery: &Delivery)
    -> Result<(), TransportError>;

    /// Best-effort request to abandon a task.
    async fn cancel(&self, worker_id: &WorkerId, task_id: &TaskId) -> Result<(), TransportError>;
}
