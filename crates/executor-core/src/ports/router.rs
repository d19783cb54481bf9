//! StageRouter port - 次のステージの決定
//!
//! Business logic per task family (e.g. the WMS optimizer ordering) lives
//! behind this trait. The engine calls it inside its critical section, so
//! implementations must be cheap and must not block.

use crate::domain::{NextStage, ResultCode, StageName, TaskId};

pub trait StageRouter: Send + Sync {
    fn next_stage(
        &self,
        task_id: &TaskId,
        current_stage: &StageName,
        result_code: &ResultCode,
    ) -> NextStage;
}

impl<F> StageRouter for F
where
    F: Fn(&TaskId, &StageName, &ResultCode) -> NextStage + Send + Sync,
{
    fn next_stage(
        &self,
        task_id: &TaskId,
        current_stage: &StageName,
        result_code: &ResultCode,
    ) -> NextStage {
        self(task_id, current_stage, result_code)
    }
}
