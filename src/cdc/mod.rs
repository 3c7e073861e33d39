//! Change-data-capture replication.
//!
//! DynamoDB stream records arrive as JSON with type-tagged attribute values.
//! [`attribute`] decodes those values into plain JSON, [`record`] classifies
//! each record into a table, key and event kind, and [`replicator`] applies
//! the result to a [`DestinationStore`](crate::destination::DestinationStore).

pub mod attribute;
pub mod record;
pub mod replicator;

pub use attribute::{decode, decode_map, AttributeValue};
pub use record::{classify, ChangeRecord, EventKind, RecordError, StreamRecord, KEY_SEPARATOR};
pub use replicator::{BatchSummary, Outcome, Replicator, StreamBatch};

use crate::destination::DestinationError;

/// Errors from applying a single record.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Destination(#[from] DestinationError),
}
