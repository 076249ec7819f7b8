use serde::Deserialize;

use crate::event::{de_counter, StageResult};

/// One entry of a stage's run history.
#[derive(Debug, Clone, Deserialize)]
pub struct StageRun {
    #[serde(deserialize_with = "de_counter")]
    pub counter: u32,
    #[serde(default = "unknown_result")]
    pub result: StageResult,
}

/// A pipeline instance with the state of all its stages.
#[derive(Debug, Deserialize)]
pub struct PipelineInstance {
    pub name: String,
    #[serde(deserialize_with = "de_counter")]
    pub counter: u32,
    #[serde(default)]
    pub stages: Vec<InstanceStage>,
}

/// Stage entry within a pipeline instance. Stages that have not run yet
/// carry no result.
#[derive(Debug, Deserialize)]
pub struct InstanceStage {
    pub name: String,
    pub result: Option<StageResult>,
}

impl PipelineInstance {
    /// Every stage has run and passed.
    pub fn is_all_green(&self) -> bool {
        !self.stages.is_empty()
            && self
                .stages
                .iter()
                .all(|stage| stage.result == Some(StageResult::Passed))
    }
}

/// One free-text warning from the server health endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthMessage {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub detail: String,
}

fn unknown_result() -> StageResult {
    StageResult::Unknown
}
