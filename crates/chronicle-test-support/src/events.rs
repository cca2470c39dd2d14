//! Event fixtures — a minimal event type, its registry and builders.

use chrono::{DateTime, Utc};
use chronicle_core::event::PendingEvent;
use chronicle_core::metadata::Metadata;
use chronicle_core::registry::TypeRegistry;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload of the fixture event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteAdded {
    /// Free-form note body.
    pub body: String,
}

/// The decoded event type used across tests.
#[derive(Debug, Clone, PartialEq)]
pub enum TestEvent {
    /// A note was added.
    NoteAdded(NoteAdded),
}

/// Registry decoding `"NoteAdded"` payloads into [`TestEvent`].
#[must_use]
pub fn test_registry() -> TypeRegistry<TestEvent> {
    TypeRegistry::new().with("NoteAdded", TestEvent::NoteAdded)
}

/// Builds a pending `NoteAdded` event tagged for the given aggregate.
///
/// # Panics
///
/// Panics if the payload fails to serialize, which it cannot.
#[must_use]
pub fn note_event(aggregate_id: Uuid, version: i64, body: &str) -> PendingEvent {
    PendingEvent::new(
        "NoteAdded",
        &NoteAdded {
            body: body.to_owned(),
        },
        Metadata::for_aggregate("note", aggregate_id, version),
    )
    .expect("fixture payload serializes")
}

/// [`note_event`] with an explicit creation timestamp.
#[must_use]
pub fn note_event_at(
    aggregate_id: Uuid,
    version: i64,
    body: &str,
    created_at: DateTime<Utc>,
) -> PendingEvent {
    note_event(aggregate_id, version, body).with_created_at(created_at)
}
