//! Errors - エラー型と分類
//!
//! Caller errors are surfaced immediately and never retried by the engine.
//! `WorkerFull` only shows up between the dispatcher and the capacity tracker:
//! it is the backpressure signal, not a failure.

use thiserror::Error;

use super::ids::{TaskId, WorkerId};

/// ErrorKind は運用上の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Programming or protocol error on the caller's side.
    Caller,
    /// No capacity right now; the task stays queued.
    Capacity,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("task {0} is already registered")]
    DuplicateTask(TaskId),

    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    #[error("worker {0} is already registered")]
    DuplicateWorker(WorkerId),

    #[error("unknown worker {0}")]
    UnknownWorker(WorkerId),

    #[error("task {0} is not assigned to a worker")]
    TaskNotAssigned(TaskId),

    #[error("worker {0} has no free slots")]
    WorkerFull(WorkerId),

    #[error("worker {worker_id} advertised invalid capacity {capacity}")]
    InvalidCapacity { worker_id: WorkerId, capacity: usize },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::WorkerFull(_) => ErrorKind::Capacity,
            _ => ErrorKind::Caller,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_full_is_backpressure() {
        let err = EngineError::WorkerFull(WorkerId::new("w1"));
        assert_eq!(err.kind(), ErrorKind::Capacity);

        let err = EngineError::DuplicateTask(TaskId::new("t1"));
        assert_eq!(err.kind(), ErrorKind::Caller);
        assert!(err.to_string().contains("t1"));
    }
}
