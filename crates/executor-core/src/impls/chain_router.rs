//! ChainRouter - 固定順序のステージ列
//!
//! Every task walks the same list of stages regardless of result code; the
//! last stage (or a stage not in the list) ends the chain.

use crate::domain::{NextStage, ResultCode, StageName, TaskId};
use crate::ports::StageRouter;

#[derive(Debug, Clone, Default)]
pub struct ChainRouter {
    stages: Vec<StageName>,
}

impl ChainRouter {
    pub fn new<I, S>(stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stages: stages.into_iter().map(StageName::new).collect(),
        }
    }

    /// Entry stage, if the chain is not empty.
    pub fn first(&self) -> Option<&StageName> {
        self.stages.first()
    }

    pub fn stages(&self) -> &[StageName] {
        &self.stages
    }
}

impl StageRouter for ChainRouter {
    fn next_stage(
        &self,
        _task_id: &TaskId,
        current_stage: &StageName,
        _result_code: &ResultCode,
    ) -> NextStage {
        let next = self
            .stages
            .iter()
            .position(|s| s == current_stage)
            .and_then(|i| self.stages.get(i + 1));
        match next {
            Some(stage) => NextStage::Stage(stage.clone()),
            None => NextStage::Terminal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("JobPath", NextStage::stage("JobSanity"))]
    #[case("JobSanity", NextStage::stage("InputData"))]
    #[case("InputData", NextStage::Terminal)]
    #[case("Unknown", NextStage::Terminal)]
    fn follows_the_chain(#[case] current: &str, #[case] expected: NextStage) {
        let router = ChainRouter::new(["JobPath", "JobSanity", "InputData"]);
        let next = router.next_stage(
            &TaskId::new("t1"),
            &StageName::new(current),
            &ResultCode::ok(),
        );
        assert_eq!(next, expected);
    }

    #[test]
    fn first_stage_is_the_entry_point() {
        let router = ChainRouter::new(["JobPath", "JobSanity"]);
        assert_eq!(router.first(), Some(&StageName::new("JobPath")));
        assert!(ChainRouter::default().first().is_none());
    }
}
