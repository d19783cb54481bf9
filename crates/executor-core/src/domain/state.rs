//! Task lifecycle state.

use serde::{Deserialize, Serialize};

/// Task state.
///
/// State transitions:
/// - Queued -> Dispatched -> Queued (next stage) ... -> Done
/// - Queued -> Dispatched -> Frozen -> Queued (same stage, after failure or timeout)
/// - Queued -> Dispatched -> Failed (retries exhausted)
/// - Queued -> Dispatched -> Queued (same stage, head; worker disconnected)
///
/// Invariant: `Dispatched` <=> the task has an owner <=> it is in no stage queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting in its stage queue.
    Queued,

    /// Handed to a worker, waiting for a report.
    Dispatched,

    /// Resting after a failure before being queued again.
    Frozen,

    /// Finished its last stage.
    Done,

    /// Gave up after exhausting retries.
    Failed,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }

    /// Is the task eligible for dispatch?
    pub fn is_dispatchable(self) -> bool {
        matches!(self, TaskState::Queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::queued(TaskState::Queued, false)]
    #[case::dispatched(TaskState::Dispatched, false)]
    #[case::frozen(TaskState::Frozen, false)]
    #[case::done(TaskState::Done, true)]
    #[case::failed(TaskState::Failed, true)]
    fn terminal_states(#[case] state: TaskState, #[case] terminal: bool) {
        assert_eq!(state.is_terminal(), terminal);
    }

    #[test]
    fn only_queued_is_dispatchable() {
        assert!(TaskState::Queued.is_dispatchable());
        assert!(!TaskState::Frozen.is_dispatchable());
        assert!(!TaskState::Dispatched.is_dispatchable());
    }
}
