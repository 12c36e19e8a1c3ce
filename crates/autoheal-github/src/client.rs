//! GitHub Actions implementation of [`WorkflowApi`].

use std::time::Duration;

use async_trait::async_trait;
use autoheal_core::workflow::{ApiError, ApiResult};
use autoheal_core::{RunRef, WorkflowApi, WorkflowJob, WorkflowRun};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::GitHubConfig;

const API_VERSION: &str = "2022-11-28";
const JOBS_PER_PAGE: usize = 100;

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct JobsPage {
    total_count: usize,
    jobs: Vec<WorkflowJob>,
}

fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout(err.to_string())
    } else if err.is_decode() {
        ApiError::Decode(err.to_string())
    } else {
        ApiError::Network(err.to_string())
    }
}

/// REST client for the Actions endpoints the remediation engine uses.
#[derive(Debug, Clone)]
pub struct GitHubActionsClient {
    config: GitHubConfig,
    http_client: reqwest::Client,
}

impl GitHubActionsClient {
    pub fn new(config: GitHubConfig) -> ApiResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ApiError::Network(format!("invalid token header: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(transport_error)?;

        Ok(GitHubActionsClient {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> ApiResult<Self> {
        Self::new(GitHubConfig::from_env())
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    fn run_url(&self, run: &RunRef) -> String {
        format!(
            "{}/repos/{}/{}/actions/runs/{}",
            self.config.base_url(),
            run.owner,
            run.repo,
            run.run_id
        )
    }

    async fn send(&self, request: RequestBuilder) -> ApiResult<Response> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.message)
            .ok()
            .filter(|m| !m.is_empty())
            .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        Err(ApiError::Http {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ApiResult<T> {
        let response = self.send(self.http_client.get(url)).await?;
        let bytes = response.bytes().await.map_err(transport_error)?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn post(&self, url: &str) -> ApiResult<()> {
        self.send(self.http_client.post(url)).await?;
        Ok(())
    }
}

#[async_trait]
impl WorkflowApi for GitHubActionsClient {
    #[instrument(skip(self), fields(run = %run))]
    async fn get_run(&self, run: &RunRef) -> ApiResult<WorkflowRun> {
        self.get_json(&self.run_url(run)).await
    }

    #[instrument(skip(self), fields(run = %run))]
    async fn rerun(&self, run: &RunRef) -> ApiResult<()> {
        self.post(&format!("{}/rerun", self.run_url(run))).await
    }

    #[instrument(skip(self), fields(run = %run))]
    async fn rerun_failed_jobs(&self, run: &RunRef) -> ApiResult<()> {
        self.post(&format!("{}/rerun-failed-jobs", self.run_url(run))).await
    }

    #[instrument(skip(self), fields(run = %run))]
    async fn list_jobs(&self, run: &RunRef) -> ApiResult<Vec<WorkflowJob>> {
        let mut jobs = Vec::new();
        let mut page = 1;
        loop {
            let url = format!(
                "{}/jobs?per_page={JOBS_PER_PAGE}&page={page}",
                self.run_url(run)
            );
            let batch: JobsPage = self.get_json(&url).await?;
            let received = batch.jobs.len();
            jobs.extend(batch.jobs);
            debug!(page, received, total = batch.total_count, "fetched job page");
            if received < JOBS_PER_PAGE || jobs.len() >= batch.total_count {
                return Ok(jobs);
            }
            page += 1;
        }
    }

    #[instrument(skip(self), fields(run = %run))]
    async fn cancel_run(&self, run: &RunRef) -> ApiResult<()> {
        self.post(&format!("{}/cancel", self.run_url(run))).await
    }

    #[instrument(skip(self), fields(run = %run))]
    async fn download_job_logs(&self, run: &RunRef, job_id: u64) -> ApiResult<Vec<u8>> {
        let url = format!(
            "{}/repos/{}/{}/actions/jobs/{job_id}/logs",
            self.config.base_url(),
            run.owner,
            run.repo
        );
        let response = self.send(self.http_client.get(&url)).await?;
        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_url() {
        let client = GitHubActionsClient::new(GitHubConfig::new("https://api.github.com/")).unwrap();
        assert_eq!(
            client.run_url(&RunRef::new("acme", "widgets", 42)),
            "https://api.github.com/repos/acme/widgets/actions/runs/42"
        );
    }

    #[test]
    fn test_invalid_token_is_rejected() {
        let config = GitHubConfig::new("https://api.github.com").with_token("bad\ntoken");
        assert!(GitHubActionsClient::new(config).is_err());
    }
}
