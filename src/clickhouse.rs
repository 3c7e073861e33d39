//! Minimal ClickHouse HTTP interface client.
//!
//! Speaks the plain HTTP protocol (port 8123/8443): statements go in the
//! `query` parameter or the request body, bound parameters travel as
//! `param_{name}` query parameters, and result rows come back as
//! `JSONEachRow` lines.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ClickHouseConfig;

/// Errors talking to ClickHouse.
#[derive(Debug, thiserror::Error)]
pub enum ClickHouseError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ClickHouse returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Failed to decode row {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for ClickHouse operations.
pub type Result<T> = std::result::Result<T, ClickHouseError>;

/// ClickHouse HTTP client.
#[derive(Clone)]
pub struct ClickHouseClient {
    http: reqwest::Client,
    endpoint: String,
    username: String,
    password: String,
    database: Option<String>,
}

impl ClickHouseClient {
    /// Build a client from configuration. Does not touch the network.
    pub fn new(config: &ClickHouseConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            database: config.database.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Verify the server is reachable.
    pub async fn ping(&self) -> Result<()> {
        let response = self
            .http
            .get(format!("{}/ping", self.endpoint))
            .send()
            .await?;
        Self::check(response).await.map(|_| ())
    }

    /// Run a statement.
    ///
    /// Without `data` the statement is sent as the request body. With
    /// `data` the statement goes in the `query` parameter and `data` is the
    /// body, which is how `INSERT ... FORMAT` statements receive their rows.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[(&str, &str)],
        data: Option<String>,
    ) -> Result<String> {
        let mut query: Vec<(String, String)> = params
            .iter()
            .map(|(name, value)| (format!("param_{}", name), value.to_string()))
            .collect();

        let body = match data {
            Some(data) => {
                query.push(("query".to_string(), sql.to_string()));
                data
            }
            None => sql.to_string(),
        };

        debug!(sql = %sql, params = params.len(), "clickhouse_execute");

        let mut request = self
            .http
            .post(&self.endpoint)
            .query(&query)
            .header("X-ClickHouse-User", &self.username)
            .header("X-ClickHouse-Key", &self.password)
            .body(body);
        if let Some(database) = &self.database {
            request = request.header("X-ClickHouse-Database", database);
        }

        Self::check(request.send().await?).await
    }

    /// Run a `SELECT` and decode each `JSONEachRow` line.
    pub async fn query_rows<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let sql = format!("{} FORMAT JSONEachRow", sql.trim().trim_end_matches(';'));
        let text = self.execute(&sql, params, None).await?;
        parse_json_each_row(&text)
    }

    async fn check(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(ClickHouseError::Server {
                status: status.as_u16(),
                body: body.trim().to_string(),
            })
        }
    }
}

/// Decode newline-delimited JSON rows, skipping blank lines.
pub fn parse_json_each_row<T: DeserializeOwned>(text: &str) -> Result<Vec<T>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| ClickHouseError::Decode {
                line: i + 1,
                source,
            })
        })
        .collect()
}

/// Quote an identifier with backticks, escaping embedded backticks and
/// backslashes.
pub fn quote_identifier(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('`', "\\`");
    format!("`{}`", escaped)
}
