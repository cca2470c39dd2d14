//! Event records exchanged with the storage layer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::metadata::{Metadata, MetadataValue};

/// An event queued for appending to a stream.
///
/// The payload is already serialized; decoding it back into a typed value
/// on the read path goes through a [`TypeRegistry`](crate::registry::TypeRegistry)
/// keyed by `event_name`.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    /// Globally unique event identifier.
    pub event_id: Uuid,
    /// Type tag used for decode routing.
    pub event_name: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Event metadata; must carry the three reserved aggregate keys for
    /// the append to satisfy the stream table's check constraints.
    pub metadata: Metadata,
    /// Timestamp of event creation.
    pub created_at: DateTime<Utc>,
}

impl PendingEvent {
    /// Builds a pending event with a fresh id and the current time.
    ///
    /// # Errors
    ///
    /// Returns the underlying error if the payload fails to serialize.
    pub fn new<P: Serialize>(
        event_name: impl Into<String>,
        payload: &P,
        metadata: Metadata,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_id: Uuid::new_v4(),
            event_name: event_name.into(),
            payload: serde_json::to_value(payload)?,
            metadata,
            created_at: Utc::now(),
        })
    }

    /// Replaces the event identifier.
    #[must_use]
    pub fn with_event_id(mut self, event_id: Uuid) -> Self {
        self.event_id = event_id;
        self
    }

    /// Replaces the creation timestamp.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_added_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        self.metadata.insert(key, value);
        self
    }
}

/// An event read back from a stream, with its payload decoded into the
/// caller's event type `E`.
#[derive(Debug, Clone)]
pub struct RecordedEvent<E> {
    /// Sequence number within the source stream's physical table.
    pub no: i64,
    /// Globally unique event identifier.
    pub event_id: Uuid,
    /// Type tag the payload was decoded by.
    pub event_name: String,
    /// Decoded payload.
    pub payload: E,
    /// Event metadata as stored.
    pub metadata: Metadata,
    /// Timestamp of event creation.
    pub created_at: DateTime<Utc>,
    /// Logical name of the stream this event was read from.
    pub stream: String,
}
