//! StageHandler port - ステージのビジネスロジック
//!
//! Implemented by in-process workers (`app::WorkerLoop`). Remote executors
//! implement the same contract on their side of the transport.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::ResultCode;
use crate::ports::Delivery;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Result<ResultCode, HandlerError>;
}
