//! Application configuration.
//!
//! Aggregates configuration from all pipelines into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod destination;

pub use destination::{ClickHouseConfig, DestinationConfig, DestinationType, SqliteConfig};

use serde::Deserialize;

use crate::impact::ImpactConfig;
use crate::webhook::WebhookConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "tributary.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "TRIBUTARY_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "TRIBUTARY";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "TRIBUTARY_LOG";
/// Environment variable selecting the log output format (`json` or text).
pub const LOG_FORMAT_ENV_VAR: &str = "TRIBUTARY_LOG_FORMAT";

/// Legacy environment variable for the ClickHouse endpoint.
pub const CLICKHOUSE_ENDPOINT_ENV_VAR: &str = "CLICKHOUSE_ENDPOINT";
/// Legacy environment variable for the ClickHouse user.
pub const CLICKHOUSE_USERNAME_ENV_VAR: &str = "CLICKHOUSE_USERNAME";
/// Legacy environment variable for the ClickHouse password.
pub const CLICKHOUSE_PASSWORD_ENV_VAR: &str = "CLICKHOUSE_PASSWORD";
/// Legacy environment variable for the GitHub API token.
pub const GITHUB_TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ClickHouse connection (destination store and query source).
    pub clickhouse: ClickHouseConfig,
    /// CDC destination selection.
    pub destination: DestinationConfig,
    /// Webhook receiver and archive.
    pub webhook: WebhookConfig,
    /// Test-impact scoring.
    pub impact: ImpactConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `tributary.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix,
    ///    e.g. `TRIBUTARY__DESTINATION__TYPE=sqlite`
    /// 5. Legacy variables `CLICKHOUSE_ENDPOINT`, `CLICKHOUSE_USERNAME`,
    ///    `CLICKHOUSE_PASSWORD`, `GITHUB_TOKEN`
    pub fn load(path: Option<&str>) -> Result<Self, ::config::ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("clickhouse.endpoint", legacy_env(CLICKHOUSE_ENDPOINT_ENV_VAR))?
            .set_override_option("clickhouse.username", legacy_env(CLICKHOUSE_USERNAME_ENV_VAR))?
            .set_override_option("clickhouse.password", legacy_env(CLICKHOUSE_PASSWORD_ENV_VAR))?
            .set_override_option("webhook.github_token", legacy_env(GITHUB_TOKEN_ENV_VAR))?
            .build()?;

        config.try_deserialize()
    }
}

fn legacy_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
