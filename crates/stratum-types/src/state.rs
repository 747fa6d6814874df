//! Channel state: the `(type, state_key)` keyed view of current
//! configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::EventId;

/// The key a state event occupies: the pair of event type and state key.
///
/// Within any single [`ChannelState`], at most one event id may be
/// associated with a given `StateKey` — the central invariant state
/// resolution preserves. `Ord` makes every state map iterate in a
/// deterministic order on every server.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateKey {
    /// The event type, e.g. `channel.member`.
    pub event_type: String,
    /// The state key; empty string is a valid key.
    pub state_key: String,
}

impl StateKey {
    /// Builds a state key from its two parts.
    pub fn new(event_type: &str, state_key: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            state_key: state_key.to_string(),
        }
    }
}

/// Immutable mapping from [`StateKey`] to the event id currently holding
/// that key.
///
/// A `ChannelState` is never mutated in place: [`ChannelState::with`]
/// returns a new value with one entry replaced, and resolution builds
/// fresh instances. Snapshots are therefore safe to share read-only across
/// concurrent readers without locking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
    entries: BTreeMap<StateKey, EventId>,
}

impl ChannelState {
    /// The empty state (a channel before its creation event).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a state from an iterator of entries. Later duplicates of a
    /// key overwrite earlier ones, so callers that must detect duplicates
    /// should check before constructing.
    pub fn from_entries(entries: impl IntoIterator<Item = (StateKey, EventId)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// The event id currently holding `key`, if any.
    pub fn get(&self, key: &StateKey) -> Option<&EventId> {
        self.entries.get(key)
    }

    /// Returns a new state with `key` set to `event_id`.
    pub fn with(&self, key: StateKey, event_id: EventId) -> Self {
        let mut entries = self.entries.clone();
        entries.insert(key, event_id);
        Self { entries }
    }

    /// Iterates entries in `StateKey` order.
    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &EventId)> {
        self.entries.iter()
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the state holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the state contains `key`.
    pub fn contains(&self, key: &StateKey) -> bool {
        self.entries.contains_key(key)
    }
}
