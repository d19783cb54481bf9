//! Events - タスクのライフサイクルイベント
//!
//! EventSink 経由で外部（monitoring / accounting）へ通知されます。
//! 遷移ごとにちょうど一回だけ発行されます。

use serde::{Deserialize, Serialize};

use super::ids::{StageName, TaskId, WorkerId};
use super::outcome::ResultCode;

/// Lifecycle notification emitted by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    /// The task was handed to a worker.
    Dispatched {
        task_id: TaskId,
        stage: StageName,
        worker_id: WorkerId,
        /// 1-based dispatch attempt for the current stage visit.
        attempt: u32,
    },

    /// The task finished `from` and was queued on `to`.
    Advanced {
        task_id: TaskId,
        from: StageName,
        to: StageName,
    },

    /// The task finished its last stage.
    Done {
        task_id: TaskId,
        stage: StageName,
        result_code: ResultCode,
    },

    /// The task exhausted its retries.
    Failed {
        task_id: TaskId,
        stage: StageName,
        retry_count: u32,
        reasons: Vec<String>,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> &TaskId {
        match self {
            TaskEvent::Dispatched { task_id, .. }
            | TaskEvent::Advanced { task_id, .. }
            | TaskEvent::Done { task_id, .. }
            | TaskEvent::Failed { task_id, .. } => task_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::Dispatched { .. } => "dispatched",
            TaskEvent::Advanced { .. } => "advanced",
            TaskEvent::Done { .. } => "done",
            TaskEvent::Failed { .. } => "failed",
        }
    }

    /// Done / Failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskEvent::Done { .. } | TaskEvent::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_tag() {
        let ev = TaskEvent::Done {
            task_id: TaskId::new("t1"),
            stage: StageName::new("JobScheduling"),
            result_code: ResultCode::ok(),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], "done");
        assert_eq!(v["task_id"], "t1");
        assert_eq!(v["result_code"], "ok");
        assert!(ev.is_terminal());
    }
}
