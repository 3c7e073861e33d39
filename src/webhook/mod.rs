//! GitHub webhook archiving.
//!
//! Receives `workflow_job`, `workflow_run` and other GitHub webhook
//! deliveries and archives them into an [`ObjectStore`](crate::archive::ObjectStore).
//! Completed jobs of the primary repository also get their log archived.
//!
//! ## Object keys
//!
//! | Event | Key | Content |
//! |-------|-----|---------|
//! | `workflow_job`, `workflow_run` | `{event}/{repo_prefix}{id}` | inner object, latest state wins |
//! | `workflow_job`, `workflow_run` | `full_{event}/{uuid}` | whole delivery |
//! | any other | `{event}/{uuid}` | whole delivery |
//! | completed `workflow_job` | `log/{id}` | job log, gzip-encoded |
//!
//! `repo_prefix` is empty for the primary repository and `{owner}/{name}/`
//! otherwise.

mod archiver;
mod github;
pub mod rest;

pub use archiver::{pretty_json, ArchiveReceipt, WebhookArchiver};
pub use github::GithubClient;

use axum::http::StatusCode;
use serde::Deserialize;

use crate::archive::{ObjectStoreConfig, ObjectStoreError};

/// Header naming the webhook event type.
pub const EVENT_HEADER: &str = "X-GitHub-Event";

/// Errors from handling a webhook delivery.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Missing X-GitHub-Event header")]
    MissingEvent,

    #[error("Invalid event name: {0}")]
    InvalidEvent(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Payload is missing {0}")]
    MissingField(&'static str),

    #[error("Object store error: {0}")]
    Store(#[from] ObjectStoreError),

    #[error("GitHub request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned {status}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

impl WebhookError {
    /// HTTP status reported to the sender.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingEvent
            | Self::InvalidEvent(_)
            | Self::InvalidPayload(_)
            | Self::MissingField(_) => StatusCode::BAD_REQUEST,
            Self::Store(_)
            | Self::Http(_)
            | Self::UnexpectedStatus { .. }
            | Self::Compression(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Webhook receiver configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Port for the HTTP listener.
    pub port: u16,
    /// Repository archived without a key prefix and whose job logs are kept.
    pub primary_repo: String,
    /// Token for downloading job logs.
    pub github_token: Option<String>,
    pub github_api_url: String,
    /// Called with `?job_id={id}` after a job log has been archived.
    pub log_classifier_url: Option<String>,
    /// Archive logs of completed jobs.
    pub archive_logs: bool,
    /// GitHub API request timeout.
    pub timeout_secs: u64,
    pub store: ObjectStoreConfig,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            primary_repo: "pytorch/pytorch".to_string(),
            github_token: None,
            github_api_url: "https://api.github.com".to_string(),
            log_classifier_url: None,
            archive_logs: true,
            timeout_secs: 30,
            store: ObjectStoreConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_config_defaults() {
        let config = WebhookConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.primary_repo, "pytorch/pytorch");
        assert!(config.archive_logs);
        assert!(config.log_classifier_url.is_none());
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(WebhookError::MissingEvent.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            WebhookError::MissingField("repository.full_name").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WebhookError::Store(ObjectStoreError::NotFound("x".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
