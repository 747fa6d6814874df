//! Well-known event types and membership values understood by the
//! baseline rule catalogue.

/// The channel creation event; always the root of the graph.
pub const CHANNEL_CREATE: &str = "channel.create";

/// Membership state events, keyed by the affected user id.
pub const CHANNEL_MEMBER: &str = "channel.member";

/// The power-level configuration state event (empty state key).
pub const CHANNEL_POWER: &str = "channel.power";

/// Plain message events (non-state).
pub const CHANNEL_MESSAGE: &str = "channel.message";

/// `content.membership` values for [`CHANNEL_MEMBER`] events.
pub const MEMBERSHIP_JOIN: &str = "join";
pub const MEMBERSHIP_INVITE: &str = "invite";
pub const MEMBERSHIP_LEAVE: &str = "leave";
