//! Error types for the event store.

use std::collections::BTreeSet;

use stratum_types::EventId;

/// Errors that can occur during event store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database operation failed.
    #[error("store database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization or deserialization of event content failed.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// One or more declared parents are absent from the store. The caller
    /// must backfill the missing events and retry; nothing was written.
    #[error("event {event_id} declares {} missing parent(s)", missing.len())]
    RejectedParents {
        /// The event whose append was rejected.
        event_id: EventId,
        /// The parents that are not present in the store.
        missing: BTreeSet<EventId>,
    },

    /// The requested event is not in the store.
    #[error("event not found: {0}")]
    NotFound(EventId),
}
