//! Outcome model: what a worker reports and where the task goes next.
//!
//! The engine never interprets a result code itself; it only hands it to the
//! `StageRouter` and, for the last stage, to the `Done` notification.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::StageName;

/// Opaque result code reported by a worker when it finishes a stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultCode(String);

impl ResultCode {
    pub const OK: &'static str = "ok";

    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The conventional "stage succeeded" code.
    pub fn ok() -> Self {
        Self::new(Self::OK)
    }

    pub fn is_ok(&self) -> bool {
        self.0 == Self::OK
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Routing decision returned by the `StageRouter` after a stage completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "stage", rename_all = "snake_case")]
pub enum NextStage {
    /// Queue the task on this stage.
    Stage(StageName),

    /// The task has no further stages.
    Terminal,
}

impl NextStage {
    pub fn stage(name: impl Into<String>) -> Self {
        NextStage::Stage(StageName::new(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_result_code() {
        assert!(ResultCode::ok().is_ok());
        assert!(!ResultCode::new("stalled").is_ok());
    }

    #[test]
    fn next_stage_is_tagged_enum() {
        let v = serde_json::to_value(NextStage::stage("JobSanity")).unwrap();
        assert_eq!(v["kind"], "stage");
        assert_eq!(v["stage"], "JobSanity");

        let v = serde_json::to_value(NextStage::Terminal).unwrap();
        assert_eq!(v["kind"], "terminal");
    }
}
