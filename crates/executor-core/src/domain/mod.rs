//! Domain model (IDs, task records, states, outcomes, events, errors).

pub mod errors;
pub mod events;
pub mod ids;
pub mod outcome;
pub mod state;
pub mod task;

pub use self::errors::{EngineError, ErrorKind};
pub use self::events::TaskEvent;
pub use self::ids::{Id, IdMarker, StageName, TaskId, WorkerId};
pub use self::outcome::{NextStage, ResultCode};
pub use self::state::TaskState;
pub use self::task::{TaskRecord, TaskView};
