//! GitHub Actions job logs.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use tracing::debug;

use super::{WebhookConfig, WebhookError};

const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

/// Downloads job logs and notifies the log classifier.
#[derive(Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
    classifier_url: Option<String>,
}

impl GithubClient {
    pub fn new(config: &WebhookConfig) -> Result<Self, WebhookError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_url: config.github_api_url.trim_end_matches('/').to_string(),
            token: config.github_token.clone().filter(|t| !t.is_empty()),
            classifier_url: config.log_classifier_url.clone().filter(|u| !u.is_empty()),
        })
    }

    pub fn job_log_url(&self, repo: &str, job_id: &str) -> String {
        format!("{}/repos/{}/actions/jobs/{}/logs", self.api_url, repo, job_id)
    }

    /// Download the plain-text log of a job.
    pub async fn download_job_log(&self, repo: &str, job_id: &str) -> Result<Vec<u8>, WebhookError> {
        let url = self.job_log_url(repo, job_id);

        let mut request = self
            .http
            .get(&url)
            .header(ACCEPT, GITHUB_ACCEPT)
            .header(USER_AGENT, concat!("tributary/", env!("CARGO_PKG_VERSION")));
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("token {}", token));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WebhookError::UnexpectedStatus {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        debug!(job_id = %job_id, size = body.len(), "job_log_downloaded");
        Ok(body.to_vec())
    }

    /// Tell the log classifier a new log is available. No-op when unset.
    pub async fn notify_classifier(&self, job_id: &str) -> Result<(), WebhookError> {
        let Some(url) = &self.classifier_url else {
            return Ok(());
        };

        let response = self
            .http
            .get(url)
            .query(&[("job_id", job_id)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(WebhookError::UnexpectedStatus {
                url: url.clone(),
                status: response.status().as_u16(),
            });
        }
        debug!(job_id = %job_id, "log_classifier_notified");
        Ok(())
    }
}
