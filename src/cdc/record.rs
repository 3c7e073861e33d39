//! Stream record classification.
//!
//! Turns a raw DynamoDB stream record into a [`ChangeRecord`]: the event
//! kind, the destination table, and the joined primary key.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::attribute::{decode_map, AttributeValue};

/// Separator between key attribute values in the joined key.
pub const KEY_SEPARATOR: &str = "|";

/// Stream ARN of a DynamoDB table. Anchored at the start only; the stream
/// suffix must be at least one character on the same line.
static DYNAMODB_TABLE_ARN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^arn:aws:dynamodb:.*?:.*?:table/(?P<table>[0-9a-zA-Z_-]+)/.+").ok()
});

/// Errors that make a stream record unusable.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Invalid value {0}, expecting a DynamoDB table")]
    InvalidSourceArn(String),

    #[error("Record has no key attributes")]
    MissingKey,

    #[error("Malformed stream record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Change event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Insert,
    Modify,
    Remove,
    Unknown,
}

impl EventKind {
    /// Classify a stream record's `eventName`.
    pub fn from_event_name(name: &str) -> Self {
        match name {
            "INSERT" => Self::Insert,
            "MODIFY" => Self::Modify,
            "REMOVE" => Self::Remove,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Modify => "MODIFY",
            Self::Remove => "REMOVE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// DynamoDB stream record as delivered by Lambda or Kinesis.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRecord {
    #[serde(default)]
    pub event_name: Option<String>,
    /// Set by Kinesis-delivered records; DynamoDB streams only carry the ARN.
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(rename = "eventSourceARN", default)]
    pub event_source_arn: Option<String>,
    #[serde(default)]
    pub dynamodb: StreamPayload,
}

/// The `dynamodb` section of a stream record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct StreamPayload {
    #[serde(rename = "Keys", default)]
    pub keys: Map<String, Value>,
    #[serde(rename = "NewImage", default, skip_serializing_if = "Option::is_none")]
    pub new_image: Option<Map<String, Value>>,
}

impl StreamRecord {
    pub fn kind(&self) -> EventKind {
        EventKind::from_event_name(self.event_name.as_deref().unwrap_or(""))
    }
}

/// A classified change ready for replication.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub kind: EventKind,
    /// Destination table, lower-cased.
    pub table: String,
    /// Key attribute values joined with [`KEY_SEPARATOR`].
    pub key: String,
    /// New image as an `M` value (insert/modify only).
    pub new_image: Option<AttributeValue>,
}

/// Classify a stream record.
pub fn classify(record: &StreamRecord) -> Result<ChangeRecord, RecordError> {
    let table = extract_table(record)?;
    let key = extract_key(record)?;

    Ok(ChangeRecord {
        kind: record.kind(),
        table,
        key,
        new_image: record
            .dynamodb
            .new_image
            .as_ref()
            .map(AttributeValue::map_from_json),
    })
}

/// Resolve the destination table name.
///
/// An explicit `tableName` wins; otherwise the name is parsed from the
/// stream ARN. The result is lower-cased.
pub fn extract_table(record: &StreamRecord) -> Result<String, RecordError> {
    if let Some(table) = record.table_name.as_deref().filter(|t| !t.is_empty()) {
        return Ok(table.to_lowercase());
    }

    let arn = record.event_source_arn.as_deref().unwrap_or("");
    table_from_arn(arn)
        .map(str::to_lowercase)
        .ok_or_else(|| RecordError::InvalidSourceArn(arn.to_string()))
}

/// Extract `{name}` from `arn:aws:dynamodb:{region}:{account}:table/{name}/{rest}`.
pub fn table_from_arn(arn: &str) -> Option<&str> {
    let captures = DYNAMODB_TABLE_ARN.as_ref()?.captures(arn)?;
    captures.name("table").map(|m| m.as_str())
}

/// Decode the key attributes and join their values in document order.
pub fn extract_key(record: &StreamRecord) -> Result<String, RecordError> {
    let keys = decode_map(&record.dynamodb.keys);
    if keys.is_empty() {
        return Err(RecordError::MissingKey);
    }

    Ok(keys
        .values()
        .map(key_part)
        .collect::<Vec<_>>()
        .join(KEY_SEPARATOR))
}

fn key_part(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> StreamRecord {
        serde_json::from_value(value).expect("valid stream record")
    }

    #[test]
    fn test_event_kind_from_event_name() {
        assert_eq!(EventKind::from_event_name("INSERT"), EventKind::Insert);
        assert_eq!(EventKind::from_event_name("MODIFY"), EventKind::Modify);
        assert_eq!(EventKind::from_event_name("REMOVE"), EventKind::Remove);
        assert_eq!(EventKind::from_event_name("insert"), EventKind::Unknown);
        assert_eq!(EventKind::from_event_name(""), EventKind::Unknown);
    }

    #[test]
    fn test_table_from_arn() {
        assert_eq!(
            table_from_arn("arn:aws:dynamodb:us-east-1:123:table/MyTable/stream/2020"),
            Some("MyTable")
        );
        assert_eq!(
            table_from_arn("arn:aws:dynamodb:us-east-1:123:table/torchci-workflow-job/stream/x"),
            Some("torchci-workflow-job")
        );
    }

    #[test]
    fn test_table_from_arn_retries_later_table_marker() {
        assert_eq!(
            table_from_arn("arn:aws:dynamodb:us-east-1:123:table/x.y:table/Real/stream/1"),
            Some("Real")
        );
        assert_eq!(
            table_from_arn("arn:aws:dynamodb:us-east-1:123:table/T/\nstream"),
            None
        );
    }

    #[test]
    fn test_table_from_malformed_arn() {
        assert_eq!(table_from_arn(""), None);
        assert_eq!(table_from_arn("arn:aws:s3:::bucket/key"), None);
        assert_eq!(table_from_arn("arn:aws:dynamodb:us-east-1:123:table/MyTable"), None);
        assert_eq!(table_from_arn("arn:aws:dynamodb:us-east-1:123:table/MyTable/"), None);
        assert_eq!(table_from_arn("arn:aws:dynamodb:us-east-1:123:table//stream"), None);
        assert_eq!(table_from_arn("arn:aws:dynamodb:us-east-1:123:table/My.Table/x"), None);
        assert_eq!(table_from_arn("arn:aws:dynamodb:us-east-1:123:table/MyTable/\n"), None);
        assert_eq!(table_from_arn("xarn:aws:dynamodb:us-east-1:123:table/MyTable/s"), None);
    }

    #[test]
    fn test_extract_table_lowercases_arn_name() {
        let r = record(json!({
            "eventSourceARN": "arn:aws:dynamodb:us-east-1:123:table/MyTable/stream/2020"
        }));
        assert_eq!(extract_table(&r).unwrap(), "mytable");
    }

    #[test]
    fn test_extract_table_prefers_explicit_name() {
        let r = record(json!({
            "tableName": "Explicit",
            "eventSourceARN": "arn:aws:dynamodb:us-east-1:123:table/Other/stream/2020"
        }));
        assert_eq!(extract_table(&r).unwrap(), "explicit");
    }

    #[test]
    fn test_extract_table_invalid_arn() {
        let r = record(json!({"eventSourceARN": "not-an-arn"}));
        assert!(matches!(
            extract_table(&r),
            Err(RecordError::InvalidSourceArn(arn)) if arn == "not-an-arn"
        ));
    }

    #[test]
    fn test_extract_key_joins_in_document_order() {
        let r = record(json!({
            "dynamodb": {"Keys": {"id": {"S": "abc"}, "sort": {"N": "5"}}}
        }));
        assert_eq!(extract_key(&r).unwrap(), "abc|5");
    }

    #[test]
    fn test_extract_key_empty() {
        let r = record(json!({"dynamodb": {"Keys": {}}}));
        assert!(matches!(extract_key(&r), Err(RecordError::MissingKey)));

        let r = record(json!({}));
        assert!(matches!(extract_key(&r), Err(RecordError::MissingKey)));
    }

    #[test]
    fn test_classify_insert() {
        let r = record(json!({
            "eventName": "INSERT",
            "eventSourceARN": "arn:aws:dynamodb:us-east-1:123:table/Jobs/stream/2020",
            "dynamodb": {
                "Keys": {"dynamoKey": {"S": "pytorch/pytorch/1"}},
                "NewImage": {"dynamoKey": {"S": "pytorch/pytorch/1"}, "status": {"S": "queued"}}
            }
        }));

        let change = classify(&r).unwrap();
        assert_eq!(change.kind, EventKind::Insert);
        assert_eq!(change.table, "jobs");
        assert_eq!(change.key, "pytorch/pytorch/1");
        assert!(matches!(change.new_image, Some(AttributeValue::M(ref fields)) if fields.len() == 2));
    }

    #[test]
    fn test_classify_remove_without_image() {
        let r = record(json!({
            "eventName": "REMOVE",
            "tableName": "jobs",
            "dynamodb": {"Keys": {"id": {"N": "7"}}}
        }));

        let change = classify(&r).unwrap();
        assert_eq!(change.kind, EventKind::Remove);
        assert_eq!(change.key, "7");
        assert!(change.new_image.is_none());
    }

    #[test]
    fn test_event_kind_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&EventKind::Modify).unwrap(), "\"MODIFY\"");
    }
}
