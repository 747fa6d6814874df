//! Error types for the invite approval workflow.

use stratum_resolve::ResolveError;
use stratum_store::StoreError;

/// Errors that can occur while building, recording, or routing an invite
/// approval. Network-level failures during submission are not errors —
/// [`submit`](crate::submit) folds them into its outcome.
#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    /// A database operation failed.
    #[error("federation database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON encoding of a request or log record failed.
    #[error("federation serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading the event graph failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Resolving the invite's state context failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The target's domain has no registered federation endpoint. Terminal:
    /// there is nowhere to submit to, so no retry can help.
    #[error("no federation peer registered for domain {0}")]
    UnknownPeer(String),
}
