use log::{debug, info, warn};
use reqwest::header::ACCEPT;
use serde::Deserialize;

use super::types::{HealthMessage, PipelineInstance, StageRun};
use super::CiServer;
use crate::config::GoCdConfig;
use crate::error::{Result, SnitchError};

const ACCEPT_V1: &str = "application/vnd.go.cd.v1+json";
const ACCEPT_V2: &str = "application/vnd.go.cd.v2+json";
const STAGE_HISTORY_PAGE_SIZE: usize = 50;

/// GoCD REST API client.
pub struct GoCdClient {
    client: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    artifact_names: Vec<String>,
    junit_file_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StageHistoryResponse {
    #[serde(default)]
    stages: Vec<StageRun>,
}

#[derive(Debug, Deserialize)]
struct ArtifactNode {
    name: String,
    url: Option<String>,
    #[serde(default)]
    files: Vec<ArtifactNode>,
}

#[derive(Debug, Deserialize)]
struct RerunResponse {
    message: String,
}

impl GoCdClient {
    pub fn new(config: &GoCdConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("snitch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SnitchError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            artifact_names: config.artifact_names.clone(),
            junit_file_names: config.junit_file_names.clone(),
        })
    }

    fn get(&self, url: &str, accept: &'static str) -> reqwest::RequestBuilder {
        let request = self.client.get(url).header(ACCEPT, accept);
        self.auth_request(request)
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(username) = &self.username {
            request.basic_auth(username, self.password.as_deref())
        } else {
            request
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        Err(SnitchError::Api(format!("{status}: {body}")))
    }

    async fn fetch_pipeline_instance(&self, pipeline: &str) -> Result<PipelineInstance> {
        let url = format!("{}/go/api/pipelines/{}", self.base_url, pipeline);
        let response = self.get(&url, ACCEPT_V1).send().await?;
        let instance: PipelineInstance = Self::check_status(response).await?.json().await?;
        debug!(
            "Fetched {}/{} with {} stages",
            instance.name,
            instance.counter,
            instance.stages.len()
        );
        Ok(instance)
    }
}

#[async_trait::async_trait]
impl CiServer for GoCdClient {
    async fn is_pipeline_green(&self, pipeline: &str) -> Result<bool> {
        let instance = self.fetch_pipeline_instance(pipeline).await?;
        Ok(instance.is_all_green())
    }

    async fn fetch_stage_history(
        &self,
        pipeline_name: &str,
        stage_name: &str,
    ) -> Result<Vec<StageRun>> {
        let url = format!(
            "{}/go/api/stages/{}/{}/history?page_size={}",
            self.base_url, pipeline_name, stage_name, STAGE_HISTORY_PAGE_SIZE
        );
        let response = self.get(&url, ACCEPT_V2).send().await?;
        let history: StageHistoryResponse = Self::check_status(response).await?.json().await?;
        Ok(history.stages)
    }

    async fn fetch_job_test_report(
        &self,
        pipeline: &str,
        stage: &str,
        job_name: &str,
    ) -> Result<Option<String>> {
        let url = format!(
            "{}/go/files/{}/{}/{}.json",
            self.base_url, pipeline, stage, job_name
        );
        info!("Fetching artifacts for {job_name}: {url}");

        let response = self.get(&url, ACCEPT_V1).send().await?;
        let listing: Vec<ArtifactNode> = Self::check_status(response).await?.json().await?;

        let Some(output_dir) = listing
            .iter()
            .find(|node| self.artifact_names.contains(&node.name))
        else {
            debug!("No test artifact directory for job {job_name}");
            return Ok(None);
        };

        let Some(report) = output_dir
            .files
            .iter()
            .find(|file| self.junit_file_names.contains(&file.name))
        else {
            debug!("No JUnit file under {} for job {job_name}", output_dir.name);
            return Ok(None);
        };

        let Some(report_url) = &report.url else {
            warn!("Artifact {} has no download URL", report.name);
            return Ok(None);
        };

        let response = self.get(report_url, ACCEPT_V1).send().await?;
        let xml = Self::check_status(response).await?.text().await?;
        Ok(Some(xml))
    }

    async fn fetch_server_health(&self) -> Result<Vec<HealthMessage>> {
        let url = format!("{}/go/api/server_health_messages", self.base_url);
        let response = self.get(&url, ACCEPT_V1).send().await?;
        Ok(Self::check_status(response).await?.json().await?)
    }

    async fn run_failed_jobs(&self, stage_uri: &str) -> Result<String> {
        let url = format!(
            "{}/go/api/stages/{}/run-failed-jobs",
            self.base_url, stage_uri
        );
        let request = self
            .client
            .post(&url)
            .header(ACCEPT, ACCEPT_V2)
            .header("X-GoCD-Confirm", "true");
        let response = self.auth_request(request).send().await?;
        let rerun: RerunResponse = Self::check_status(response).await?.json().await?;
        info!("Rerun response: {}", rerun.message);
        Ok(rerun.message)
    }
}
