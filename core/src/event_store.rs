//! Persistence contract for ledger event streams.
//!
//! The store is append-only with optimistic concurrency per stream: an append
//! names the version it expects the stream to be at and fails with
//! [`EventStoreError::ConcurrencyConflict`] if another writer got there first.
//!
//! Besides per-stream reads the store exposes the global append order
//! ([`EventStore::load_all`]), which is what ledger recovery replays: a
//! return request must be applied after the delivery it refers to.

use crate::event::SerializedEvent;
use crate::stream::{StreamId, Version};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`EventStore`] methods
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EventStoreError>> + Send + 'a>>;

/// Errors raised by an event store backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    /// The stream is not at the expected version
    #[error("concurrency conflict on {stream_id}: expected {expected}, found {actual}")]
    ConcurrencyConflict {
        /// Stream that was appended to
        stream_id: StreamId,
        /// Version the writer expected
        expected: Version,
        /// Version actually found
        actual: Version,
    },

    /// Backend unavailable or query failed
    #[error("database error: {0}")]
    DatabaseError(String),

    /// Stored bytes could not be encoded or decoded
    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// An event as stored, with its position.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedEvent {
    /// Stream it belongs to
    pub stream_id: StreamId,
    /// Version of the stream after this event (1-based)
    pub version: Version,
    /// Position in the global append order (1-based)
    pub position: u64,
    /// Payload
    pub event: SerializedEvent,
}

/// Append-only event storage.
///
/// Methods return boxed futures so the store can live behind
/// `Arc<dyn EventStore>`.
pub trait EventStore: Send + Sync {
    /// Appends `events` to `stream_id`.
    ///
    /// With `Some(expected)`, the append succeeds only if the stream is
    /// currently at `expected`. Returns the stream's new version.
    ///
    /// # Errors
    ///
    /// - [`EventStoreError::ConcurrencyConflict`] on a version mismatch
    /// - [`EventStoreError::DatabaseError`] when the backend fails
    fn append_events(
        &self,
        stream_id: StreamId,
        expected_version: Option<Version>,
        events: Vec<SerializedEvent>,
    ) -> StoreFuture<'_, Version>;

    /// Loads a stream's events, oldest first, starting after `from_version`
    /// when given. An unknown stream is empty, not an error.
    ///
    /// # Errors
    ///
    /// [`EventStoreError::DatabaseError`] when the backend fails.
    fn load_events(
        &self,
        stream_id: StreamId,
        from_version: Option<Version>,
    ) -> StoreFuture<'_, Vec<SerializedEvent>>;

    /// Loads every event of every stream in global append order.
    ///
    /// # Errors
    ///
    /// [`EventStoreError::DatabaseError`] when the backend fails.
    fn load_all(&self) -> StoreFuture<'_, Vec<RecordedEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ReturnId;

    #[test]
    fn conflict_display_names_versions() {
        let error = EventStoreError::ConcurrencyConflict {
            stream_id: StreamId::return_request(ReturnId::new()),
            expected: Version::new(3),
            actual: Version::new(4),
        };
        let message = error.to_string();
        assert!(message.contains("expected v3"));
        assert!(message.contains("found v4"));
    }
}
