//! Task registry: the authoritative map of live tasks.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{EngineError, TaskId, TaskRecord, TaskState};

/// Counts of live tasks by state (terminal tasks leave the registry).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub queued: usize,
    pub dispatched: usize,
    pub frozen: usize,
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    records: HashMap<TaskId, TaskRecord>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: TaskRecord) -> Result<(), EngineError> {
        match self.records.entry(record.id.clone()) {
            Entry::Occupied(e) => Err(EngineError::DuplicateTask(e.key().clone())),
            Entry::Vacant(e) => {
                e.insert(record);
                Ok(())
            }
        }
    }

    pub fn get(&self, task_id: &TaskId) -> Option<&TaskRecord> {
        self.records.get(task_id)
    }

    pub fn get_mut(&mut self, task_id: &TaskId) -> Option<&mut TaskRecord> {
        self.records.get_mut(task_id)
    }

    /// Like `get_mut`, but an absent task is an `UnknownTask` error.
    pub fn require_mut(&mut self, task_id: &TaskId) -> Result<&mut TaskRecord, EngineError> {
        self.records
            .get_mut(task_id)
            .ok_or_else(|| EngineError::UnknownTask(task_id.clone()))
    }

    pub fn remove(&mut self, task_id: &TaskId) -> Option<TaskRecord> {
        self.records.remove(task_id)
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.records.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskRecord> {
        self.records.values()
    }

    /// Dispatched tasks whose deadline has passed, oldest deadline first.
    pub fn overdue(&self, now: DateTime<Utc>) -> Vec<TaskId> {
        let mut overdue: Vec<&TaskRecord> =
            self.records.values().filter(|r| r.is_overdue(now)).collect();
        overdue.sort_by_key(|r| r.deadline);
        overdue.into_iter().map(|r| r.id.clone()).collect()
    }

    /// Frozen tasks ready to go back to their queue, earliest thaw first.
    pub fn thawed(&self, now: DateTime<Utc>) -> Vec<TaskId> {
        let mut thawed: Vec<&TaskRecord> =
            self.records.values().filter(|r| r.is_thawed(now)).collect();
        thawed.sort_by_key(|r| r.thaw_at);
        thawed.into_iter().map(|r| r.id.clone()).collect()
    }

    pub fn counts_by_state(&self) -> TaskCounts {
        let mut counts = TaskCounts::default();
        for record in self.records.values() {
            match record.state {
                TaskState::Queued => counts.queued += 1,
                TaskState::Dispatched => counts.dispatched += 1,
                TaskState::Frozen => counts.frozen += 1,
                TaskState::Done | TaskState::Failed => {}
            }
        }
        counts
    }
}
