//! Error types for state resolution.

use stratum_store::StoreError;
use stratum_types::StateKey;

/// Errors that can occur while resolving channel state.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Reading the event graph failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Every candidate for a conflicted key failed re-authorization, so no
    /// single event can hold the key. The supplied rule catalogue admitted
    /// events it later refuses to re-authorize — a defect in the rules,
    /// not a data condition, and picking a winner arbitrarily would break
    /// confluence across servers.
    #[error("no candidate for state key ({event_type}, {state_key}) survives re-authorization",
        event_type = key.event_type, state_key = key.state_key)]
    UnresolvedConflict {
        /// The key that could not be resolved.
        key: StateKey,
    },
}
