//! Event-store error types.

use thiserror::Error;

/// Top-level error type for event-store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The requested stream is not registered.
    #[error("stream not found: {stream}")]
    StreamNotFound {
        /// Logical name of the missing stream.
        stream: String,
    },

    /// A stream with this name is already registered.
    #[error("stream already exists: {stream}")]
    StreamAlreadyExists {
        /// Logical name of the conflicting stream.
        stream: String,
    },

    /// The requested projection has no bookkeeping row.
    #[error("projection not found: {name}")]
    ProjectionNotFound {
        /// Name of the missing projection.
        name: String,
    },

    /// Optimistic concurrency conflict: another event already claimed the
    /// same aggregate version in this stream.
    #[error("concurrency conflict on stream {stream}")]
    ConcurrencyConflict {
        /// Logical name of the stream the conflicting batch targeted.
        stream: String,
    },

    /// The storage engine rejected the DDL for a stream's physical table.
    #[error("schema creation failed for stream {stream}: {reason}")]
    SchemaCreationFailed {
        /// Logical name of the stream whose table could not be created.
        stream: String,
        /// Storage-reported rejection reason.
        reason: String,
    },

    /// An event payload could not be decoded into a typed value.
    #[error("failed to decode event {event_name}: {reason}")]
    DecodeFailed {
        /// Event name the decoder was looked up by.
        event_name: String,
        /// Decoder-reported reason.
        reason: String,
    },

    /// Any other underlying storage fault (connectivity, timeout,
    /// unclassified constraint violation).
    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    /// Wraps an arbitrary storage-layer fault.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    /// Returns `true` if this error is an optimistic concurrency conflict.
    #[must_use]
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}
