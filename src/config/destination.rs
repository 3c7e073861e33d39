//! Destination store configuration types.

use std::path::PathBuf;

use serde::Deserialize;

/// Destination type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationType {
    /// ClickHouse over its HTTP interface.
    #[default]
    Clickhouse,
    /// Local SQLite file (requires `sqlite` feature).
    Sqlite,
}

/// Destination configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    /// Destination type discriminator.
    #[serde(rename = "type")]
    pub destination_type: DestinationType,
    /// SQLite-specific configuration.
    pub sqlite: SqliteConfig,
}

/// ClickHouse connection settings.
///
/// Shared by the CDC destination and the test-impact query source.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClickHouseConfig {
    /// HTTP(S) endpoint, e.g. `https://host:8443`.
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Database sent as `X-ClickHouse-Database`; server default when unset.
    pub database: Option<String>,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8123".to_string(),
            username: "default".to_string(),
            password: String::new(),
            database: None,
            timeout_secs: 30,
        }
    }
}

/// SQLite-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file. Created if missing.
    pub path: PathBuf,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("tributary.db"),
        }
    }
}
