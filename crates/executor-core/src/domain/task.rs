//! Task record: routing metadata + opaque payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{StageName, TaskId, WorkerId};
use super::state::TaskState;

/// Routing metadata for one task.
///
/// Design:
/// - This is the "single source of truth" for task state.
/// - Stage queues and workers hold TaskId only.
/// - All state transitions happen here; callers pass the current time in.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: TaskId,
    pub stage: StageName,
    pub state: TaskState,

    /// Worker holding the task while `Dispatched`.
    pub owner: Option<WorkerId>,

    /// Failures and timeouts so far.
    pub retry_count: u32,

    /// Dispatch attempts for the current stage visit.
    pub attempts: u32,

    /// When a `Dispatched` task is considered stuck.
    pub deadline: Option<DateTime<Utc>>,

    /// When a `Frozen` task goes back to its queue.
    pub thaw_at: Option<DateTime<Utc>>,

    /// Never inspected by the engine.
    pub payload: serde_json::Value,

    /// Accumulated failure reasons, oldest first.
    pub failures: Vec<String>,

    /// Set by `remove_task` while dispatched; the task is dropped when the
    /// current attempt resolves.
    pub cancelled: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(
        id: TaskId,
        stage: StageName,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            stage,
            state: TaskState::Queued,
            owner: None,
            retry_count: 0,
            attempts: 0,
            deadline: None,
            thaw_at: None,
            payload,
            failures: Vec::new(),
            cancelled: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Hand the task to `worker` until `deadline`.
    pub fn dispatch(&mut self, worker: WorkerId, deadline: DateTime<Utc>, now: DateTime<Utc>) {
        self.state = TaskState::Dispatched;
        self.owner = Some(worker);
        self.deadline = Some(deadline);
        self.attempts += 1;
        self.updated_at = now;
    }

    /// Clear ownership and wait in the queue again (same stage).
    pub fn requeue(&mut self, now: DateTime<Utc>) {
        self.state = TaskState::Queued;
        self.owner = None;
        self.deadline = None;
        self.thaw_at = None;
        self.updated_at = now;
    }

    /// Move to the next stage.
    pub fn advance(&mut self, next: StageName, now: DateTime<Utc>) {
        self.requeue(now);
        self.stage = next;
        self.attempts = 0;
    }

    /// Rest until `thaw_at` (call `record_failure` first).
    pub fn freeze(&mut self, thaw_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.state = TaskState::Frozen;
        self.owner = None;
        self.deadline = None;
        self.thaw_at = Some(thaw_at);
        self.updated_at = now;
    }

    /// Bump the retry counter and remember why.
    pub fn record_failure(&mut self, reason: String) {
        self.retry_count += 1;
        self.failures.push(reason);
    }

    pub fn mark_done(&mut self, now: DateTime<Utc>) {
        self.state = TaskState::Done;
        self.owner = None;
        self.deadline = None;
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, now: DateTime<Utc>) {
        self.state = TaskState::Failed;
        self.owner = None;
        self.deadline = None;
        self.thaw_at = None;
        self.updated_at = now;
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.state == TaskState::Dispatched && self.deadline.is_some_and(|d| d <= now)
    }

    pub fn is_thawed(&self, now: DateTime<Utc>) -> bool {
        self.state == TaskState::Frozen && self.thaw_at.is_some_and(|t| t <= now)
    }

    pub fn view(&self) -> TaskView {
        TaskView {
            task_id: self.id.clone(),
            stage: self.stage.clone(),
            state: self.state,
            owner: self.owner.clone(),
            retry_count: self.retry_count,
            deadline: self.deadline,
            failures: self.failures.clone(),
            cancelled: self.cancelled,
        }
    }
}

/// Serializable view of a task for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub task_id: TaskId,
    pub stage: StageName,
    pub state: TaskState,
    pub owner: Option<WorkerId>,
    pub retry_count: u32,
    pub deadline: Option<DateTime<Utc>>,
    pub failures: Vec<String>,
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn record() -> TaskRecord {
        TaskRecord::new(
            TaskId::new("t1"),
            StageName::new("JobPath"),
            serde_json::json!({"owner": "alice"}),
            now(),
        )
    }

    #[test]
    fn new_record_is_queued_without_owner() {
        let r = record();
        assert_eq!(r.state, TaskState::Queued);
        assert!(r.owner.is_none());
        assert_eq!(r.retry_count, 0);
    }

    #[test]
    fn dispatch_sets_owner_and_deadline() {
        let mut r = record();
        let deadline = now() + Duration::seconds(60);
        r.dispatch(WorkerId::new("w1"), deadline, now());

        assert_eq!(r.state, TaskState::Dispatched);
        assert_eq!(r.owner, Some(WorkerId::new("w1")));
        assert_eq!(r.attempts, 1);
        assert!(!r.is_overdue(now()));
        assert!(r.is_overdue(deadline));
    }

    #[test]
    fn freeze_counts_failure_and_clears_owner() {
        let mut r = record();
        r.dispatch(WorkerId::new("w1"), now(), now());
        r.record_failure("boom".to_string());
        r.freeze(now() + Duration::seconds(5), now());

        assert_eq!(r.state, TaskState::Frozen);
        assert!(r.owner.is_none());
        assert_eq!(r.retry_count, 1);
        assert_eq!(r.failures, vec!["boom".to_string()]);
        assert!(!r.is_thawed(now()));
        assert!(r.is_thawed(now() + Duration::seconds(5)));
    }

    #[test]
    fn advance_resets_attempts_but_keeps_retries() {
        let mut r = record();
        r.dispatch(WorkerId::new("w1"), now(), now());
        r.record_failure("flaky".to_string());
        r.advance(StageName::new("JobSanity"), now());

        assert_eq!(r.stage, StageName::new("JobSanity"));
        assert_eq!(r.state, TaskState::Queued);
        assert_eq!(r.attempts, 0);
        assert_eq!(r.retry_count, 1);
    }
}
