//! tributary-webhook: GitHub webhook archiver
//!
//! Listens for GitHub webhook deliveries and archives them into object
//! storage (see `tributary::webhook` for the key layout).
//!
//! ## Configuration
//! - `webhook.port`: listen port (default 8080)
//! - `webhook.store`: `filesystem` (default) or `s3`
//! - GITHUB_TOKEN: token for job log downloads
//! - TRIBUTARY_LOG: log filter (default `info`)

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use tributary::archive::init_object_store;
use tributary::config::Config;
use tributary::webhook::{rest, GithubClient, WebhookArchiver};

/// Archive GitHub webhook deliveries.
#[derive(Parser)]
#[command(name = "tributary-webhook", version)]
struct Cli {
    /// Configuration file (YAML).
    #[arg(short, long)]
    config: Option<String>,

    /// Override the configured listen port.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tributary::utils::bootstrap::init_tracing();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    let webhook = &config.webhook;

    let store = init_object_store(&webhook.store)
        .await
        .map_err(|e| e.to_string())?;

    let github = if webhook.archive_logs {
        Some(GithubClient::new(webhook)?)
    } else {
        info!("Job log archiving disabled");
        None
    };

    let archiver = WebhookArchiver::new(store, github, webhook.primary_repo.clone());
    rest::serve(Arc::new(archiver), cli.port.unwrap_or(webhook.port)).await
}
