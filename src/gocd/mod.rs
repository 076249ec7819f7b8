mod client;
mod types;

use async_trait::async_trait;

pub use client::GoCdClient;
pub use types::{HealthMessage, PipelineInstance, StageRun};

use crate::error::Result;

/// Operations the notification core needs from the CI server.
///
/// The production implementation is [`GoCdClient`]; tests substitute fakes.
#[async_trait]
pub trait CiServer {
    /// Whether every stage of the given pipeline instance (`name/counter`)
    /// has passed.
    async fn is_pipeline_green(&self, pipeline: &str) -> Result<bool>;

    /// Past runs of a stage, most recent first.
    async fn fetch_stage_history(
        &self,
        pipeline_name: &str,
        stage_name: &str,
    ) -> Result<Vec<StageRun>>;

    /// JUnit XML body of a job's test report artifact, if the job uploaded
    /// one. `pipeline` and `stage` are `name/counter` pairs.
    async fn fetch_job_test_report(
        &self,
        pipeline: &str,
        stage: &str,
        job_name: &str,
    ) -> Result<Option<String>>;

    /// Current server health warnings.
    async fn fetch_server_health(&self) -> Result<Vec<HealthMessage>>;

    /// Trigger a rerun of the failed jobs of a stage (`pipeline/counter/stage/counter`).
    async fn run_failed_jobs(&self, stage_uri: &str) -> Result<String>;
}
