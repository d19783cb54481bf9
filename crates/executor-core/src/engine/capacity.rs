//! Capacity tracker: per-worker slots grouped by stage.
//!
//! Design:
//! - `workers` is the single source of truth for assignments.
//! - `owners` is the reverse index (task -> worker) so `release` is O(1).
//! - `by_stage` keeps workers of each stage in registration order.
//! - Invariant: `owners` and every worker's `assigned` list are kept in sync.

use std::collections::HashMap;

use crate::domain::{EngineError, StageName, TaskId, WorkerId};

/// One registered worker connection.
#[derive(Debug, Clone)]
pub struct WorkerInstance {
    pub id: WorkerId,
    pub stage: StageName,
    pub max_capacity: usize,

    /// Assigned tasks, oldest assignment first.
    pub assigned: Vec<TaskId>,

    /// Monotonic registration order (lower = registered earlier).
    pub registered_seq: u64,
}

impl WorkerInstance {
    pub fn free_slots(&self) -> usize {
        self.max_capacity.saturating_sub(self.assigned.len())
    }
}

/// A worker that can take at least one more task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeWorker {
    pub worker_id: WorkerId,
    pub free_slots: usize,
    pub registered_seq: u64,
}

/// Picks the destination among free workers of one stage.
pub trait SelectionPolicy: Send + Sync {
    fn select<'a>(&self, candidates: &'a [FreeWorker]) -> Option<&'a FreeWorker>;
}

/// Most free slots first; ties go to the worker registered longest ago.
#[derive(Debug, Clone, Copy, Default)]
pub struct MostFreeSlots;

impl SelectionPolicy for MostFreeSlots {
    fn select<'a>(&self, candidates: &'a [FreeWorker]) -> Option<&'a FreeWorker> {
        candidates.iter().min_by(|a, b| {
            b.free_slots
                .cmp(&a.free_slots)
                .then(a.registered_seq.cmp(&b.registered_seq))
        })
    }
}

/// Fill the oldest worker before touching newer ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct OldestFirst;

impl SelectionPolicy for OldestFirst {
    fn select<'a>(&self, candidates: &'a [FreeWorker]) -> Option<&'a FreeWorker> {
        candidates.iter().min_by_key(|w| w.registered_seq)
    }
}

#[derive(Debug, Default)]
pub struct CapacityTracker {
    workers: HashMap<WorkerId, WorkerInstance>,
    owners: HashMap<TaskId, WorkerId>,
    by_stage: HashMap<StageName, Vec<WorkerId>>,
    next_seq: u64,
}

impl CapacityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_worker(
        &mut self,
        worker_id: WorkerId,
        stage: StageName,
        max_capacity: usize,
    ) -> Result<(), EngineError> {
        if self.workers.contains_key(&worker_id) {
            return Err(EngineError::DuplicateWorker(worker_id));
        }
        if max_capacity == 0 {
            return Err(EngineError::InvalidCapacity {
                worker_id,
                capacity: max_capacity,
            });
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_stage
            .entry(stage.clone())
            .or_default()
            .push(worker_id.clone());
        self.workers.insert(
            worker_id.clone(),
            WorkerInstance {
                id: worker_id,
                stage,
                max_capacity,
                assigned: Vec::new(),
                registered_seq: seq,
            },
        );
        Ok(())
    }

    /// Remove a worker and hand back the tasks it held, oldest assignment first.
    pub fn unregister_worker(
        &mut self,
        worker_id: &WorkerId,
    ) -> Result<WorkerInstance, EngineError> {
        let worker = self
            .workers
            .remove(worker_id)
            .ok_or_else(|| EngineError::UnknownWorker(worker_id.clone()))?;

        for task_id in &worker.assigned {
            self.owners.remove(task_id);
        }
        if let Some(ids) = self.by_stage.get_mut(&worker.stage) {
            ids.retain(|id| id != worker_id);
            if ids.is_empty() {
                self.by_stage.remove(&worker.stage);
            }
        }
        Ok(worker)
    }

    pub fn assign(&mut self, worker_id: &WorkerId, task_id: TaskId) -> Result<(), EngineError> {
        let worker = self
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| EngineError::UnknownWorker(worker_id.clone()))?;
        if worker.free_slots() == 0 {
            return Err(EngineError::WorkerFull(worker_id.clone()));
        }

        worker.assigned.push(task_id.clone());
        self.owners.insert(task_id, worker_id.clone());
        Ok(())
    }

    /// Free the slot held by `task_id`, returning the worker that held it.
    pub fn release(&mut self, task_id: &TaskId) -> Result<WorkerId, EngineError> {
        let worker_id = self
            .owners
            .remove(task_id)
            .ok_or_else(|| EngineError::TaskNotAssigned(task_id.clone()))?;
        if let Some(worker) = self.workers.get_mut(&worker_id) {
            worker.assigned.retain(|id| id != task_id);
        }
        Ok(worker_id)
    }

    pub fn owner_of(&self, task_id: &TaskId) -> Option<&WorkerId> {
        self.owners.get(task_id)
    }

    pub fn worker(&self, worker_id: &WorkerId) -> Option<&WorkerInstance> {
        self.workers.get(worker_id)
    }

    pub fn free_slots(&self, worker_id: &WorkerId) -> Result<usize, EngineError> {
        self.workers
            .get(worker_id)
            .map(WorkerInstance::free_slots)
            .ok_or_else(|| EngineError::UnknownWorker(worker_id.clone()))
    }

    /// Workers of `stage` with at least one free slot, in registration order.
    pub fn free_workers_for_stage(&self, stage: &StageName) -> Vec<FreeWorker> {
        self.workers_for_stage(stage)
            .into_iter()
            .filter(|w| w.free_slots() > 0)
            .map(|w| FreeWorker {
                worker_id: w.id.clone(),
                free_slots: w.free_slots(),
                registered_seq: w.registered_seq,
            })
            .collect()
    }

    pub fn has_free_worker(&self, stage: &StageName) -> bool {
        self.workers_for_stage(stage)
            .iter()
            .any(|w| w.free_slots() > 0)
    }

    /// All workers of `stage`, in registration order.
    pub fn workers_for_stage(&self, stage: &StageName) -> Vec<&WorkerInstance> {
        self.by_stage
            .get(stage)
            .into_iter()
            .flatten()
            .filter_map(|id| self.workers.get(id))
            .collect()
    }

    pub fn stages(&self) -> impl Iterator<Item = &StageName> {
        self.by_stage.keys()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> StageName {
        StageName::new("type1")
    }

    fn tracker_with(workers: &[(&str, usize)]) -> CapacityTracker {
        let mut t = CapacityTracker::new();
        for (id, cap) in workers {
            t.register_worker(WorkerId::new(*id), stage(), *cap).unwrap();
        }
        t
    }

    #[test]
    fn register_rejects_duplicates_and_zero_capacity() {
        let mut t = tracker_with(&[("w1", 2)]);

        let err = t.register_worker(WorkerId::new("w1"), stage(), 1).unwrap_err();
        assert_eq!(err, EngineError::DuplicateWorker(WorkerId::new("w1")));

        let err = t.register_worker(WorkerId::new("w2"), stage(), 0).unwrap_err();
        assert!(matches!(err, EngineError::InvalidCapacity { capacity: 0, .. }));
    }

    #[test]
    fn assign_respects_capacity() {
        let mut t = tracker_with(&[("w1", 2)]);
        let w1 = WorkerId::new("w1");

        t.assign(&w1, TaskId::new("t1")).unwrap();
        t.assign(&w1, TaskId::new("t2")).unwrap();
        assert_eq!(t.free_slots(&w1).unwrap(), 0);

        let err = t.assign(&w1, TaskId::new("t3")).unwrap_err();
        assert_eq!(err, EngineError::WorkerFull(w1.clone()));
        assert!(t.free_workers_for_stage(&stage()).is_empty());

        let err = t.assign(&WorkerId::new("ghost"), TaskId::new("t3")).unwrap_err();
        assert_eq!(err, EngineError::UnknownWorker(WorkerId::new("ghost")));
    }

    #[test]
    fn release_frees_slot_and_reports_owner() {
        let mut t = tracker_with(&[("w1", 1)]);
        let w1 = WorkerId::new("w1");
        t.assign(&w1, TaskId::new("t1")).unwrap();

        assert_eq!(t.release(&TaskId::new("t1")).unwrap(), w1);
        assert_eq!(t.free_slots(&w1).unwrap(), 1);

        let err = t.release(&TaskId::new("t1")).unwrap_err();
        assert_eq!(err, EngineError::TaskNotAssigned(TaskId::new("t1")));
    }

    #[test]
    fn unregister_returns_assigned_tasks_in_order() {
        let mut t = tracker_with(&[("w1", 3)]);
        let w1 = WorkerId::new("w1");
        t.assign(&w1, TaskId::new("a")).unwrap();
        t.assign(&w1, TaskId::new("b")).unwrap();

        let worker = t.unregister_worker(&w1).unwrap();
        assert_eq!(worker.assigned, vec![TaskId::new("a"), TaskId::new("b")]);
        assert!(t.owner_of(&TaskId::new("a")).is_none());
        assert_eq!(t.worker_count(), 0);
        assert!(t.workers_for_stage(&stage()).is_empty());

        let err = t.unregister_worker(&w1).unwrap_err();
        assert_eq!(err, EngineError::UnknownWorker(w1));
    }

    #[test]
    fn most_free_slots_prefers_spare_capacity_then_seniority() {
        let mut t = tracker_with(&[("old", 2), ("new", 2), ("big", 4)]);
        let policy = MostFreeSlots;

        let free = t.free_workers_for_stage(&stage());
        assert_eq!(policy.select(&free).unwrap().worker_id, WorkerId::new("big"));

        t.assign(&WorkerId::new("big"), TaskId::new("t1")).unwrap();
        t.assign(&WorkerId::new("big"), TaskId::new("t2")).unwrap();

        // big, old and new all have 2 free slots: oldest registration wins.
        let free = t.free_workers_for_stage(&stage());
        assert_eq!(policy.select(&free).unwrap().worker_id, WorkerId::new("old"));
    }

    #[test]
    fn oldest_first_ignores_free_slots() {
        let t = tracker_with(&[("old", 1), ("big", 8)]);
        let free = t.free_workers_for_stage(&stage());
        assert_eq!(OldestFirst.select(&free).unwrap().worker_id, WorkerId::new("old"));
        assert!(OldestFirst.select(&[]).is_none());
    }

    #[test]
    fn workers_are_grouped_by_stage() {
        let mut t = tracker_with(&[("w1", 1)]);
        t.register_worker(WorkerId::new("w2"), StageName::new("type2"), 1)
            .unwrap();

        assert!(t.has_free_worker(&stage()));
        assert!(t.has_free_worker(&StageName::new("type2")));
        assert!(!t.has_free_worker(&StageName::new("type3")));
        assert_eq!(t.free_workers_for_stage(&stage()).len(), 1);
    }
}
