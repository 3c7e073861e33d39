//! Tributary - stateless CI data pipelines.
//!
//! - [`cdc`]: replicate DynamoDB stream batches into ClickHouse or SQLite
//! - [`webhook`]: archive GitHub webhook deliveries and job logs
//! - [`impact`]: score changed files against historically failing tests

pub mod archive;
pub mod cdc;
pub mod clickhouse;
pub mod config;
pub mod destination;
pub mod impact;
pub mod utils;
pub mod webhook;
