//! Stage queues: ordered, deduplicated waiting lists, one per stage.
//!
//! Design:
//! - Each stage keeps a `VecDeque` of `(TaskId, generation)` entries.
//! - `index` maps a queued task to its stage and live generation.
//! - `remove` only drops the index entry; the stale deque entry is skipped
//!   lazily by `pop`/`snapshot`, so every operation is O(1) amortized.
//! - A lane exists only while it holds live entries; it is dropped as soon
//!   as it drains, so `stages()` lists stages with queued work only.
//! - Invariant: a task id is in `index` at most once, i.e. in at most one
//!   stage queue engine-wide.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::domain::{StageName, TaskId};

/// Result of popping a stage queue. An empty queue is a normal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Popped {
    Found(TaskId),
    Empty,
}

impl Popped {
    pub fn into_option(self) -> Option<TaskId> {
        match self {
            Popped::Found(task_id) => Some(task_id),
            Popped::Empty => None,
        }
    }
}

#[derive(Debug, Default)]
struct Lane {
    entries: VecDeque<(TaskId, u64)>,
    live: usize,
}

impl Lane {
    fn stale(&self) -> usize {
        self.entries.len() - self.live
    }
}

#[derive(Debug, Default)]
pub struct StageQueues {
    lanes: HashMap<StageName, Lane>,
    index: HashMap<TaskId, (StageName, u64)>,
    next_generation: u64,
}

impl StageQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task_id` on `stage` (at the head when `ahead`).
    ///
    /// No-op if the task is already queued on this stage. Returns the
    /// resulting queue length.
    ///
    /// A task queued on another stage is moved: a task id lives in one
    /// queue at most.
    pub fn push(&mut self, stage: &StageName, task_id: TaskId, ahead: bool) -> usize {
        if let Some((queued_on, _)) = self.index.get(&task_id) {
            if queued_on == stage {
                return self.len(stage);
            }
            self.remove(&task_id);
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        self.index
            .insert(task_id.clone(), (stage.clone(), generation));

        let lane = self.lanes.entry(stage.clone()).or_default();
        if ahead {
            lane.entries.push_front((task_id, generation));
        } else {
            lane.entries.push_back((task_id, generation));
        }
        lane.live += 1;
        lane.live
    }

    /// Take the head of `stage`'s queue.
    pub fn pop(&mut self, stage: &StageName) -> Popped {
        let Some(lane) = self.lanes.get_mut(stage) else {
            return Popped::Empty;
        };

        let mut found = None;
        while let Some((task_id, generation)) = lane.entries.pop_front() {
            let is_live = matches!(
                self.index.get(&task_id),
                Some((s, g)) if s == stage && *g == generation
            );
            if is_live {
                self.index.remove(&task_id);
                lane.live -= 1;
                found = Some(task_id);
                break;
            }
        }
        if lane.live == 0 {
            self.lanes.remove(stage);
        }
        found.map_or(Popped::Empty, Popped::Found)
    }

    /// Take `task_id` out of whichever queue holds it.
    pub fn remove(&mut self, task_id: &TaskId) -> Option<StageName> {
        let (stage, _) = self.index.remove(task_id)?;
        let drained = match self.lanes.get_mut(&stage) {
            Some(lane) => {
                lane.live -= 1;
                if lane.live > 0 && lane.stale() > lane.live.max(16) {
                    Self::compact(lane, &self.index, &stage);
                }
                lane.live == 0
            }
            None => false,
        };
        if drained {
            self.lanes.remove(&stage);
        }
        Some(stage)
    }

    pub fn len(&self, stage: &StageName) -> usize {
        self.lanes.get(stage).map_or(0, |lane| lane.live)
    }

    pub fn is_empty(&self, stage: &StageName) -> bool {
        self.len(stage) == 0
    }

    pub fn total_len(&self) -> usize {
        self.index.len()
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.index.contains_key(task_id)
    }

    pub fn stages(&self) -> impl Iterator<Item = &StageName> {
        self.lanes.keys()
    }

    /// Live queue contents per stage, head first.
    pub fn snapshot(&self) -> BTreeMap<StageName, Vec<TaskId>> {
        self.lanes
            .iter()
            .map(|(stage, lane)| {
                let ids: Vec<TaskId> = lane
                    .entries
                    .iter()
                    .filter(|(task_id, generation)| {
                        matches!(
                            self.index.get(task_id),
                            Some((s, g)) if s == stage && g == generation
                        )
                    })
                    .map(|(task_id, _)| task_id.clone())
                    .collect();
                (stage.clone(), ids)
            })
            .collect()
    }

    fn compact(lane: &mut Lane, index: &HashMap<TaskId, (StageName, u64)>, stage: &StageName) {
        lane.entries.retain(|(task_id, generation)| {
            matches!(index.get(task_id), Some((s, g)) if s == stage && g == generation)
        });
    }
}
