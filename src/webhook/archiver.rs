//! Webhook routing and object naming.

use std::io::{self, Write};
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter};
use serde_json::{Map, Value};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::github::GithubClient;
use super::WebhookError;
use crate::archive::{validate_key, ArchiveObject, ObjectStore, CONTENT_ENCODING_GZIP};

const WORKFLOW_JOB: &str = "workflow_job";
const WORKFLOW_RUN: &str = "workflow_run";

/// Keys written for one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReceipt {
    pub event: String,
    pub keys: Vec<String>,
}

/// Archives webhook deliveries into an object store.
pub struct WebhookArchiver {
    store: Arc<dyn ObjectStore>,
    github: Option<GithubClient>,
    primary_repo: String,
}

impl WebhookArchiver {
    /// `github` is `None` when job logs should not be archived.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        github: Option<GithubClient>,
        primary_repo: impl Into<String>,
    ) -> Self {
        Self {
            store,
            github,
            primary_repo: primary_repo.into(),
        }
    }

    /// Archive one delivery.
    ///
    /// Job log failures are logged and never fail the delivery.
    pub async fn handle(&self, event: &str, body: &Value) -> Result<ArchiveReceipt, WebhookError> {
        validate_key(event).map_err(|_| WebhookError::InvalidEvent(event.to_string()))?;
        if event.contains('/') {
            return Err(WebhookError::InvalidEvent(event.to_string()));
        }
        if !body.is_object() {
            return Err(WebhookError::MissingField("payload object"));
        }

        let keys = match event {
            WORKFLOW_JOB | WORKFLOW_RUN => self.archive_workflow(event, body).await?,
            _ => {
                let key = format!("{}/{}", event, Uuid::new_v4());
                self.put_json(&key, body).await?;
                vec![key]
            }
        };

        info!(event = %event, objects = keys.len(), "webhook_archived");
        Ok(ArchiveReceipt {
            event: event.to_string(),
            keys,
        })
    }

    async fn archive_workflow(&self, event: &str, body: &Value) -> Result<Vec<String>, WebhookError> {
        let object = body
            .get(event)
            .filter(|o| o.is_object())
            .ok_or(WebhookError::MissingField("workflow object"))?;
        let repo = body
            .pointer("/repository/full_name")
            .and_then(Value::as_str)
            .ok_or(WebhookError::MissingField("repository.full_name"))?;
        let id = object
            .get("id")
            .and_then(id_string)
            .ok_or(WebhookError::MissingField("workflow id"))?;

        let mut keys = Vec::with_capacity(3);

        let completed = body.get("action").and_then(Value::as_str) == Some("completed");
        if event == WORKFLOW_JOB && completed && repo == self.primary_repo {
            let conclusion = object
                .get("conclusion")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if let Some(key) = self.archive_job_log(&id, conclusion).await {
                keys.push(key);
            }
        }

        // Keyed by id so redeliveries overwrite: the object is always the
        // latest state. Non-primary repos are prefixed to avoid id clashes.
        let key = format!("{}/{}{}", event, self.repo_prefix(repo), id);
        self.put_json(&key, object).await?;
        keys.push(key);

        let full_key = format!("full_{}/{}", event, Uuid::new_v4());
        self.put_json(&full_key, body).await?;
        keys.push(full_key);

        Ok(keys)
    }

    /// Download, store, and announce a job log.
    async fn archive_job_log(&self, job_id: &str, conclusion: &str) -> Option<String> {
        let github = self.github.as_ref()?;
        let key = format!("log/{}", job_id);

        let result = async {
            let log = github.download_job_log(&self.primary_repo, job_id).await?;
            let object = ArchiveObject::text(key.clone(), gzip(&log)?)
                .with_content_encoding(CONTENT_ENCODING_GZIP)
                .with_metadata("conclusion", conclusion);
            self.store.put(object).await?;
            github.notify_classifier(job_id).await?;
            Ok::<_, WebhookError>(())
        }
        .await;

        match result {
            Ok(()) => {
                debug!(job_id = %job_id, "job_log_archived");
                Some(key)
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to archive job log");
                None
            }
        }
    }

    fn repo_prefix(&self, repo: &str) -> String {
        if repo == self.primary_repo {
            String::new()
        } else {
            format!("{}/", repo)
        }
    }

    async fn put_json(&self, key: &str, value: &Value) -> Result<(), WebhookError> {
        let object = ArchiveObject::json(key, pretty_json(value)?);
        self.store.put(object).await?;
        Ok(())
    }
}

/// Webhook ids are numbers; accept strings too.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn gzip(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// Serialize with keys sorted at every level and four-space indentation.
///
/// Non-ASCII characters are written as `\uXXXX` escapes (UTF-16 surrogate
/// pairs outside the BMP), so archived payloads are pure ASCII.
pub fn pretty_json(value: &Value) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    let formatter = AsciiFormatter(PrettyFormatter::with_indent(b"    "));
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    sorted(value).serialize(&mut serializer)?;
    Ok(out)
}

/// Pretty printing with every character outside printable ASCII escaped.
struct AsciiFormatter<'a>(PrettyFormatter<'a>);

impl Formatter for AsciiFormatter<'_> {
    fn write_string_fragment<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut start = 0;
        for (i, c) in fragment.char_indices() {
            if (' '..='~').contains(&c) {
                continue;
            }
            writer.write_all(&fragment.as_bytes()[start..i])?;
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = i + c.len_utf8();
        }
        writer.write_all(&fragment.as_bytes()[start..])
    }

    fn begin_array<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_array(writer)
    }

    fn end_array<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.0.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object(writer)
    }

    fn end_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.0.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object_value(writer)
    }
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sorted(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}
