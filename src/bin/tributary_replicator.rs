//! tributary-replicator: DynamoDB stream batch replicator
//!
//! Reads one stream batch (`{"Records": [...]}`) from a file or stdin,
//! replicates it into the configured destination, and prints the batch
//! summary as JSON on stdout.
//!
//! ## Configuration
//! - `destination.type`: `clickhouse` (default) or `sqlite`
//! - CLICKHOUSE_ENDPOINT / CLICKHOUSE_USERNAME / CLICKHOUSE_PASSWORD
//! - TRIBUTARY_LOG: log filter (default `info`)
//!
//! A destination that cannot be reached fails the whole batch.

use std::io::Read;
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use tributary::cdc::{Replicator, StreamBatch};
use tributary::config::Config;
use tributary::destination::connect_destination;

/// Replicate a DynamoDB stream batch.
#[derive(Parser)]
#[command(name = "tributary-replicator", version)]
struct Cli {
    /// Configuration file (YAML).
    #[arg(short, long)]
    config: Option<String>,

    /// Batch file; reads stdin when omitted or `-`.
    input: Option<PathBuf>,
}

fn read_batch(input: Option<&PathBuf>) -> std::io::Result<String> {
    match input {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path),
        _ => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tributary::utils::bootstrap::init_tracing();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let batch: StreamBatch = serde_json::from_str(&read_batch(cli.input.as_ref())?)?;
    info!(records = batch.records.len(), "Starting batch");

    let store = connect_destination(&config.destination, &config.clickhouse)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to connect destination");
            e
        })?;

    let summary = Replicator::new(store).process_batch(&batch).await;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
