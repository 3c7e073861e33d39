//! Replicator + SQLite destination integration tests.
//!
//! Run with: cargo test --test replicator_sqlite --features sqlite
//!
//! Uses a temporary database file, no external dependencies required.

use std::sync::Arc;

use serde_json::{json, Value};
use tributary::cdc::{Replicator, StreamBatch};
use tributary::config::{ClickHouseConfig, DestinationConfig, DestinationType, SqliteConfig};
use tributary::destination::{connect_destination, SqliteDestination};

const ARN: &str = "arn:aws:dynamodb:us-east-1:308535385114:table/torchci-workflow-job/stream/2022-01-14T01:31:51.775";

fn record(event: &str, key: &str, status: Option<&str>) -> Value {
    let mut record = json!({
        "eventName": event,
        "eventSourceARN": ARN,
        "dynamodb": {"Keys": {"dynamoKey": {"S": key}}}
    });
    if let Some(status) = status {
        record["dynamodb"]["NewImage"] = json!({
            "dynamoKey": {"S": key},
            "status": {"S": status},
            "runner": {"M": {"labels": {"SS": ["linux", "gpu"]}, "id": {"N": "17"}}},
            "steps": {"L": [{"S": "checkout"}, {"NULL": true}]}
        });
    }
    record
}

fn batch(records: Vec<Value>) -> StreamBatch {
    serde_json::from_value(json!({ "Records": records })).expect("valid batch")
}

#[tokio::test]
async fn test_batch_builds_append_only_history() {
    let store = Arc::new(SqliteDestination::in_memory().await.unwrap());
    let replicator = Replicator::new(store.clone());

    let summary = replicator
        .process_batch(&batch(vec![
            record("INSERT", "pytorch/pytorch/1", Some("queued")),
            record("MODIFY", "pytorch/pytorch/1", Some("in_progress")),
            record("MODIFY", "pytorch/pytorch/1", Some("completed")),
            record("INSERT", "pytorch/pytorch/2", Some("queued")),
        ]))
        .await;

    assert_eq!(summary.insert, 2);
    assert_eq!(summary.modify, 2);
    assert_eq!(summary.applied, 4);
    assert_eq!(summary.failed, 0);

    let versions = store
        .versions("torchci-workflow-job", "pytorch/pytorch/1")
        .await
        .unwrap();
    let statuses: Vec<_> = versions.iter().map(|v| v["status"].clone()).collect();
    assert_eq!(statuses, vec!["queued", "in_progress", "completed"]);

    let latest = store
        .latest("torchci-workflow-job", "pytorch/pytorch/1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest["runner"], json!({"labels": ["linux", "gpu"], "id": 17}));
    assert_eq!(latest["steps"], json!(["checkout", null]));
}

#[tokio::test]
async fn test_remove_deletes_every_version_of_key() {
    let store = Arc::new(SqliteDestination::in_memory().await.unwrap());
    let replicator = Replicator::new(store.clone());

    let summary = replicator
        .process_batch(&batch(vec![
            record("INSERT", "k1", Some("queued")),
            record("MODIFY", "k1", Some("completed")),
            record("INSERT", "k2", Some("queued")),
            record("REMOVE", "k1", None),
        ]))
        .await;

    assert_eq!(summary.remove, 1);
    assert!(store
        .versions("torchci-workflow-job", "k1")
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        store.versions("torchci-workflow-job", "k2").await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_unusable_records_do_not_stop_batch() {
    let store = Arc::new(SqliteDestination::in_memory().await.unwrap());
    let replicator = Replicator::new(store.clone());

    let mut bad_arn = record("INSERT", "k1", Some("queued"));
    bad_arn["eventSourceARN"] = json!("arn:aws:sqs:us-east-1:1:queue");
    let mut empty_image = record("INSERT", "k3", None);
    empty_image["dynamodb"]["NewImage"] = json!({});

    let summary = replicator
        .process_batch(&batch(vec![
            bad_arn,
            record("TTL_EXPIRE", "k2", Some("queued")),
            empty_image,
            record("INSERT", "k4", Some("queued")),
        ]))
        .await;

    assert_eq!(summary.total(), 4);
    assert_eq!(summary.unrecognized, 1);
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.applied, 1);
    assert_eq!(
        store.versions("torchci-workflow-job", "k4").await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_connect_destination_sqlite_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cdc.db");
    let config = DestinationConfig {
        destination_type: DestinationType::Sqlite,
        sqlite: SqliteConfig { path: path.clone() },
    };

    let store = connect_destination(&config, &ClickHouseConfig::default())
        .await
        .unwrap();
    assert_eq!(store.backend(), "sqlite");

    let summary = Replicator::new(store)
        .process_batch(&batch(vec![record("INSERT", "k1", Some("queued"))]))
        .await;

    assert_eq!(summary.applied, 1);
    assert!(path.exists());
}
