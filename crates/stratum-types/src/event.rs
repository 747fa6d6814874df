//! The immutable event record that makes up channel history.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{ChannelId, EventId, UserId};
use crate::state::StateKey;

/// A single unit of channel history.
///
/// Events are created once — authored locally or received over federation —
/// and never mutated afterwards. An event is a *state event* iff
/// `state_key` is present; the empty string is a valid state key.
///
/// `depth` is `max(parent depths) + 1` (`0` for a parentless creation
/// event). It is monotonically non-decreasing along any path through the
/// graph and is used as a resolution tie-break, never as a substitute for
/// causal ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Content-derived identifier, unique within the channel.
    pub id: EventId,
    /// The channel this event belongs to.
    pub channel_id: ChannelId,
    /// The user that authored the event.
    pub sender: UserId,
    /// Event type, e.g. `channel.member`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// State key. `Some("")` is a valid key; `None` means non-state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,
    /// Structured event content.
    pub content: Value,
    /// Ids of the events this event extends.
    pub parents: BTreeSet<EventId>,
    /// `max(parent depths) + 1`, `0` for the root.
    pub depth: u64,
}

impl Event {
    /// Constructs a new event on top of the given parents, deriving depth
    /// and the content-derived id.
    pub fn new(
        channel_id: ChannelId,
        sender: UserId,
        event_type: &str,
        state_key: Option<&str>,
        content: Value,
        parents: &[&Event],
    ) -> Self {
        let depth = parents
            .iter()
            .map(|p| p.depth)
            .max()
            .map(|d| d + 1)
            .unwrap_or(0);
        let parent_ids: BTreeSet<EventId> = parents.iter().map(|p| p.id.clone()).collect();
        let id = compute_id(
            &channel_id,
            &sender,
            event_type,
            state_key,
            &content,
            &parent_ids,
            depth,
        );
        Self {
            id,
            channel_id,
            sender,
            event_type: event_type.to_string(),
            state_key: state_key.map(str::to_string),
            content,
            parents: parent_ids,
            depth,
        }
    }

    /// Whether this event carries a piece of channel state.
    pub fn is_state(&self) -> bool {
        self.state_key.is_some()
    }

    /// The `(type, state_key)` pair for state events, `None` otherwise.
    pub fn state_pair(&self) -> Option<StateKey> {
        self.state_key
            .as_ref()
            .map(|key| StateKey::new(&self.event_type, key))
    }

    /// Recomputes the content-derived id and compares it to the declared
    /// one. Events arriving over the wire declare their id; a mismatch
    /// means the event was tampered with or malformed at the source.
    pub fn id_is_consistent(&self) -> bool {
        compute_id(
            &self.channel_id,
            &self.sender,
            &self.event_type,
            self.state_key.as_deref(),
            &self.content,
            &self.parents,
            self.depth,
        ) == self.id
    }
}

/// Derives the event id from the canonical JSON of the hashable fields.
///
/// `serde_json` maps are BTree-ordered, so the encoding — and therefore the
/// id — is a pure function of the event's content, independent of field
/// insertion order on the authoring server.
fn compute_id(
    channel_id: &ChannelId,
    sender: &UserId,
    event_type: &str,
    state_key: Option<&str>,
    content: &Value,
    parents: &BTreeSet<EventId>,
    depth: u64,
) -> EventId {
    let canonical = serde_json::json!({
        "channel_id": channel_id,
        "content": content,
        "depth": depth,
        "parents": parents,
        "sender": sender,
        "state_key": state_key,
        "type": event_type,
    });
    // Serializing a Value cannot fail.
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    EventId::from_content(&bytes)
}
