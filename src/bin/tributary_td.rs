//! tributary-td: test-impact scorer
//!
//! - `ratings`: correlate changed files with failing tests and write the
//!   score mapping as JSON
//! - `evaluate`: rank historical failures with a score mapping, print the
//!   aggregate accuracy and write the per-file CSV report
//!
//! ## Configuration
//! - `impact.repo`, `impact.lookback_days`, `impact.sample_stride`
//! - `impact.cache`: on-disk query cache
//! - CLICKHOUSE_ENDPOINT / CLICKHOUSE_USERNAME / CLICKHOUSE_PASSWORD

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use tributary::clickhouse::ClickHouseClient;
use tributary::config::Config;
use tributary::impact::evaluate::format_stat;
use tributary::impact::{
    build_scores, evaluate, load_mapping, save_mapping, History, ImpactSource, TestGranularity,
};

/// Test-impact scoring.
#[derive(Parser)]
#[command(name = "tributary-td", version)]
struct Cli {
    /// Configuration file (YAML).
    #[arg(short, long)]
    config: Option<String>,

    /// Override the configured test granularity.
    #[arg(long, value_enum)]
    granularity: Option<TestGranularity>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the changed file -> failing test score mapping.
    Ratings {
        /// Output file.
        #[arg(short, long, default_value = "ratings.json")]
        output: PathBuf,
    },

    /// Evaluate a score mapping against historical failures.
    Evaluate {
        /// Score mapping written by `ratings`.
        #[arg(short, long, default_value = "ratings.json")]
        ratings: PathBuf,

        /// Per-file CSV report.
        #[arg(short, long, default_value = "results.csv")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tributary::utils::bootstrap::init_tracing();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    if let Some(granularity) = cli.granularity {
        config.impact.granularity = granularity;
    }
    let impact = &config.impact;

    let source = ImpactSource::new(
        ClickHouseClient::new(&config.clickhouse)?,
        impact.cache.build(),
        impact.repo.clone(),
        impact.lookback_days,
    );
    let history = History::load(&source).await?;

    match cli.command {
        Commands::Ratings { output } => {
            let mapping = build_scores(&history.tests, &history.merge_bases, impact.granularity);
            save_mapping(&output, &mapping).await?;
            info!(
                changed_files = mapping.len(),
                path = %output.display(),
                "ratings_written"
            );
        }
        Commands::Evaluate { ratings, output } => {
            let mapping = load_mapping(&ratings).await?;
            let candidates = source.invoking_files().await?;
            let report = evaluate(
                &history.tests,
                &history.merge_bases,
                &mapping,
                &candidates,
                &impact.evaluation_options(),
            );

            println!("average: {}", format_stat(report.average()));
            println!("median: {}", format_stat(report.median()));
            println!("within 10%: {}", format_stat(report.within_top_fraction()));
            println!("# of invoking files: {}", report.candidate_count);

            report.write_csv(BufWriter::new(File::create(&output)?))?;
            info!(path = %output.display(), "evaluation_written");
        }
    }

    Ok(())
}
