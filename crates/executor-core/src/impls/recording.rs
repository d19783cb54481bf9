//! RecordingTransport - テスト用の Transport
//!
//! Remembers every delivery and cancel instead of sending anything. Workers
//! marked with `fail_worker` reject deliveries as disconnected.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::{TaskId, WorkerId};
use crate::ports::{Delivery, Transport, TransportError};

#[derive(Debug, Default)]
struct Recorded {
    deliveries: Vec<(WorkerId, Delivery)>,
    cancels: Vec<(WorkerId, TaskId)>,
    failing: HashSet<WorkerId>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful deliveries, in send order.
    pub fn deliveries(&self) -> Vec<(WorkerId, Delivery)> {
        self.lock().deliveries.clone()
    }

    pub fn delivered_to(&self, worker_id: &WorkerId) -> Vec<TaskId> {
        self.lock()
            .deliveries
            .iter()
            .filter(|(w, _)| w == worker_id)
            .map(|(_, d)| d.task_id.clone())
            .collect()
    }

    pub fn cancels(&self) -> Vec<(WorkerId, TaskId)> {
        self.lock().cancels.clone()
    }

    pub fn fail_worker(&self, worker_id: &WorkerId) {
        self.lock().failing.insert(worker_id.clone());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn deliver(
        &self,
        worker_id: &WorkerId,
        delivery: &Delivery,
    ) -> Result<(), TransportError> {
        let mut inner = self.lock();
        if inner.failing.contains(worker_id) {
            return Err(TransportError::Disconnected(worker_id.clone()));
        }
        inner.deliveries.push((worker_id.clone(), delivery.clone()));
        Ok(())
    }

    async fn cancel(&self, worker_id: &WorkerId, task_id: &TaskId) -> Result<(), TransportError> {
        let mut inner = self.lock();
        if inner.failing.contains(worker_id) {
            return Err(TransportError::Disconnected(worker_id.clone()));
        }
        inner.cancels.push((worker_id.clone(), task_id.clone()));
        Ok(())
    }
}
