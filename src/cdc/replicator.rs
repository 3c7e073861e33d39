//! Batch replication of stream records into a destination store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::attribute::decode;
use super::record::{classify, EventKind, RecordError, StreamRecord};
use super::ReplicationError;
use crate::destination::DestinationStore;

/// Inbound batch as delivered by the stream trigger.
///
/// Records stay raw JSON until they are processed so one malformed record
/// cannot reject the whole batch.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StreamBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<Value>,
}

/// End-of-batch tally.
///
/// Every record lands in exactly one of the kind buckets. `applied`,
/// `skipped` and `failed` describe what happened to the records of known
/// kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    #[serde(rename = "INSERT")]
    pub insert: usize,
    #[serde(rename = "MODIFY")]
    pub modify: usize,
    #[serde(rename = "REMOVE")]
    pub remove: usize,
    #[serde(rename = "UNRECOGNIZED")]
    pub unrecognized: usize,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn count(&mut self, kind: EventKind) {
        match kind {
            EventKind::Insert => self.insert += 1,
            EventKind::Modify => self.modify += 1,
            EventKind::Remove => self.remove += 1,
            EventKind::Unknown => self.unrecognized += 1,
        }
    }

    /// Count for one event kind.
    pub fn of(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::Insert => self.insert,
            EventKind::Modify => self.modify,
            EventKind::Remove => self.remove,
            EventKind::Unknown => self.unrecognized,
        }
    }

    /// Records seen in the batch.
    pub fn total(&self) -> usize {
        self.insert + self.modify + self.remove + self.unrecognized
    }
}

/// What happened to a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Upserted { table: String, key: String },
    Deleted { table: String, key: String },
    /// Nothing to do: empty key, empty image, or unknown event kind.
    Skipped,
}

/// Replicates stream batches into a destination store.
pub struct Replicator {
    store: Arc<dyn DestinationStore>,
}

impl Replicator {
    pub fn new(store: Arc<dyn DestinationStore>) -> Self {
        Self { store }
    }

    /// Process every record in order.
    ///
    /// Failures are logged per record and never stop the batch.
    pub async fn process_batch(&self, batch: &StreamBatch) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for raw in &batch.records {
            self.process_raw(raw, &mut summary).await;
        }

        info!(
            backend = self.store.backend(),
            insert = summary.insert,
            modify = summary.modify,
            remove = summary.remove,
            unrecognized = summary.unrecognized,
            applied = summary.applied,
            skipped = summary.skipped,
            failed = summary.failed,
            summary = %serde_json::to_string(&summary).unwrap_or_default(),
            "batch_processed"
        );

        summary
    }

    async fn process_raw(&self, raw: &Value, summary: &mut BatchSummary) {
        let event_name = raw.get("eventName").and_then(Value::as_str).unwrap_or("");
        summary.count(EventKind::from_event_name(event_name));

        let record: StreamRecord = match serde_json::from_value(raw.clone()) {
            Ok(record) => record,
            Err(e) => {
                warn!(record = %raw, error = %e, "Failed to parse stream record");
                summary.skipped += 1;
                return;
            }
        };

        match self.apply(&record).await {
            Ok(Outcome::Skipped) => summary.skipped += 1,
            Ok(_) => summary.applied += 1,
            Err(ReplicationError::Record(RecordError::InvalidSourceArn(arn))) => {
                warn!(arn = %arn, "Invalid source ARN, expecting a DynamoDB table");
                summary.skipped += 1;
            }
            Err(ReplicationError::Record(e)) => {
                debug!(error = %e, "Skipping unusable record");
                summary.skipped += 1;
            }
            Err(ReplicationError::Destination(e)) => {
                error!(record = %raw, error = %e, "Failed to process record");
                summary.failed += 1;
            }
        }
    }

    /// Apply one record to the destination.
    pub async fn apply(&self, record: &StreamRecord) -> Result<Outcome, ReplicationError> {
        match record.kind() {
            EventKind::Insert | EventKind::Modify => self.upsert(record).await,
            EventKind::Remove => self.remove(record).await,
            EventKind::Unknown => {
                warn!(
                    event_name = record.event_name.as_deref().unwrap_or(""),
                    record = %serde_json::to_string(record).unwrap_or_default(),
                    "Unrecognized event type"
                );
                Ok(Outcome::Skipped)
            }
        }
    }

    /// Insert a new row version. The destination never updates in place.
    async fn upsert(&self, record: &StreamRecord) -> Result<Outcome, ReplicationError> {
        let change = classify(record)?;

        let document = match change.new_image.as_ref().and_then(decode) {
            Some(Value::Object(document)) if !document.is_empty() => document,
            _ => return Ok(Outcome::Skipped),
        };

        debug!(key = %change.key, table = %change.table, "upserting_document");
        self.store
            .insert_row(&change.table, &change.key, &document)
            .await?;

        Ok(Outcome::Upserted {
            table: change.table,
            key: change.key,
        })
    }

    async fn remove(&self, record: &StreamRecord) -> Result<Outcome, ReplicationError> {
        let change = classify(record)?;

        debug!(key = %change.key, table = %change.table, "deleting_document");
        self.store.delete_by_key(&change.table, &change.key).await?;

        Ok(Outcome::Deleted {
            table: change.table,
            key: change.key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::{MockDestinationStore, RecordedStatement};
    use serde_json::json;

    const ARN: &str = "arn:aws:dynamodb:us-east-1:123456789012:table/WorkflowJob/stream/2024-01-01";

    fn insert(key: &str) -> Value {
        json!({
            "eventName": "INSERT",
            "eventSourceARN": ARN,
            "dynamodb": {
                "Keys": {"dynamoKey": {"S": key}},
                "NewImage": {
                    "dynamoKey": {"S": key},
                    "status": {"S": "queued"},
                    "attempt": {"N": "1"}
                }
            }
        })
    }

    fn remove(key: &str) -> Value {
        json!({
            "eventName": "REMOVE",
            "eventSourceARN": ARN,
            "dynamodb": {"Keys": {"dynamoKey": {"S": key}}}
        })
    }

    fn batch(records: Vec<Value>) -> StreamBatch {
        StreamBatch { records }
    }

    fn replicator() -> (Arc<MockDestinationStore>, Replicator) {
        let store = Arc::new(MockDestinationStore::new());
        let replicator = Replicator::new(store.clone());
        (store, replicator)
    }

    #[tokio::test]
    async fn test_insert_issues_row_insert_with_decoded_document() {
        let (store, replicator) = replicator();

        let summary = replicator.process_batch(&batch(vec![insert("k1")])).await;

        assert_eq!(summary.insert, 1);
        assert_eq!(summary.applied, 1);
        let inserts = store.inserts().await;
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0].0, "workflowjob");
        assert_eq!(inserts[0].1, "k1");
        assert_eq!(
            Value::Object(inserts[0].2.clone()),
            json!({"dynamoKey": "k1", "status": "queued", "attempt": 1})
        );
    }

    #[tokio::test]
    async fn test_modify_inserts_new_version() {
        let (store, replicator) = replicator();
        let mut modify = insert("k1");
        modify["eventName"] = json!("MODIFY");

        let summary = replicator.process_batch(&batch(vec![insert("k1"), modify])).await;

        assert_eq!(summary.insert, 1);
        assert_eq!(summary.modify, 1);
        assert_eq!(store.inserts().await.len(), 2);
        assert!(store.deletes().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_issues_exactly_one_delete() {
        let (store, replicator) = replicator();

        let summary = replicator.process_batch(&batch(vec![remove("k1")])).await;

        assert_eq!(summary.remove, 1);
        assert_eq!(
            store.statements().await,
            vec![RecordedStatement::Delete {
                table: "workflowjob".to_string(),
                key: "k1".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_empty_new_image_issues_nothing() {
        let (store, replicator) = replicator();
        let mut record = insert("k1");
        record["dynamodb"]["NewImage"] = json!({});
        let mut missing = insert("k2");
        missing["dynamodb"]
            .as_object_mut()
            .unwrap()
            .remove("NewImage");

        let summary = replicator.process_batch(&batch(vec![record, missing])).await;

        assert_eq!(summary.insert, 2);
        assert_eq!(summary.skipped, 2);
        assert!(store.statements().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_event_is_counted_without_statement() {
        let (store, replicator) = replicator();
        let mut record = insert("k1");
        record["eventName"] = json!("TRUNCATE");

        let summary = replicator.process_batch(&batch(vec![record])).await;

        assert_eq!(summary.unrecognized, 1);
        assert_eq!(summary.of(EventKind::Unknown), 1);
        assert_eq!(summary.skipped, 1);
        assert!(store.statements().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_arn_is_dropped() {
        let (store, replicator) = replicator();
        let mut record = insert("k1");
        record["eventSourceARN"] = json!("arn:aws:kinesis:us-east-1:123:stream/x");

        let summary = replicator.process_batch(&batch(vec![record, remove("k2")])).await;

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.applied, 1);
        assert_eq!(store.statements().await.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_key_is_dropped() {
        let (store, replicator) = replicator();
        let mut record = remove("k1");
        record["dynamodb"]["Keys"] = json!({});

        let summary = replicator.process_batch(&batch(vec![record])).await;

        assert_eq!(summary.remove, 1);
        assert_eq!(summary.skipped, 1);
        assert!(store.statements().await.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_does_not_abort_batch() {
        let (store, replicator) = replicator();
        store.fail_on_key("bad").await;

        let records = vec![insert("k1"), insert("bad"), remove("k2"), insert("k3")];
        let summary = replicator.process_batch(&batch(records)).await;

        assert_eq!(store.statements().await.len(), 4);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.applied, 3);
        assert_eq!(summary.insert, 3);
        assert_eq!(summary.remove, 1);
        assert_eq!(summary.total(), 4);
    }

    #[tokio::test]
    async fn test_malformed_record_is_counted_and_skipped() {
        let (store, replicator) = replicator();
        let malformed = json!({"eventName": "INSERT", "dynamodb": "not-an-object"});

        let summary = replicator.process_batch(&batch(vec![malformed, insert("k1")])).await;

        assert_eq!(summary.insert, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.applied, 1);
        assert_eq!(store.inserts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_explicit_table_name_is_used() {
        let (store, replicator) = replicator();
        let mut record = insert("k1");
        record["tableName"] = json!("Torchci-Workflow-Run");

        replicator.process_batch(&batch(vec![record])).await;

        assert_eq!(store.inserts().await[0].0, "torchci-workflow-run");
    }

    #[test]
    fn test_summary_serializes_kind_buckets() {
        let summary = BatchSummary {
            insert: 2,
            unrecognized: 1,
            ..BatchSummary::default()
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["INSERT"], 2);
        assert_eq!(json["UNRECOGNIZED"], 1);
        assert_eq!(json["failed"], 0);
    }

    #[test]
    fn test_stream_batch_deserializes_records() {
        let batch: StreamBatch =
            serde_json::from_value(json!({"Records": [insert("a"), remove("b")]})).unwrap();
        assert_eq!(batch.records.len(), 2);

        let empty: StreamBatch = serde_json::from_value(json!({})).unwrap();
        assert!(empty.records.is_empty());
    }
}
