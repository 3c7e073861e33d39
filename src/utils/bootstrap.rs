//! Bootstrap utilities for tributary binaries.
//!
//! Shared initialization code for the replicator, webhook and scorer
//! binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LOG_ENV_VAR, LOG_FORMAT_ENV_VAR};

/// Initialize tracing with the TRIBUTARY_LOG environment variable.
///
/// Defaults to "info" level if TRIBUTARY_LOG is not set. Set
/// TRIBUTARY_LOG_FORMAT=json for one JSON object per line.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json_output(std::env::var(LOG_FORMAT_ENV_VAR).ok().as_deref()) {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn json_output(format: Option<&str>) -> bool {
    format.is_some_and(|f| f.eq_ignore_ascii_case("json"))
}
