//! Engine - ルーティングの中核
//!
//! Capacity tracking, per-stage queues and the task registry, tied together
//! by the `Dispatcher`.

pub mod capacity;
pub mod dispatcher;
pub mod registry;
pub mod retry;
pub mod snapshot;
pub mod stage_queue;

pub use self::capacity::{
    CapacityTracker, FreeWorker, MostFreeSlots, OldestFirst, SelectionPolicy, WorkerInstance,
};
pub use self::dispatcher::Dispatcher;
pub use self::registry::{TaskCounts, TaskRegistry};
pub use self::retry::{RetryDecision, RetryPolicy};
pub use self::snapshot::{EngineSnapshot, StageStatus, SweepReport, WorkerSlots};
pub use self::stage_queue::{Popped, StageQueues};
