//! Diagnostic views of the engine (`Dispatcher::state`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::registry::TaskCounts;
use crate::domain::{StageName, WorkerId};

/// Free capacity of one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSlots {
    pub id: WorkerId,
    pub free_slots: usize,
    pub max_capacity: usize,
}

/// Queue depth and workers of one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStatus {
    pub queued: usize,
    /// In registration order.
    pub workers: Vec<WorkerSlots>,
}

impl StageStatus {
    pub fn free_slots(&self) -> usize {
        self.workers.iter().map(|w| w.free_slots).sum()
    }
}

/// Point-in-time view of the whole engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub stages: BTreeMap<StageName, StageStatus>,
    pub tasks: TaskCounts,
}

impl EngineSnapshot {
    pub fn stage(&self, name: &str) -> Option<&StageStatus> {
        self.stages.get(name)
    }
}

/// What one timeout sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Dispatched tasks whose deadline had passed.
    pub expired: usize,
    /// Frozen tasks put back on their queue.
    pub thawed: usize,
    /// Expired tasks that ran out of retries.
    pub failed: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired == 0 && self.thawed == 0
    }
}
