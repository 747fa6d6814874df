//! Shared types and error definitions for the Stratum platform.
//!
//! This crate provides the foundational types used across all Stratum
//! crates: channel, user and event identifiers, the immutable [`Event`]
//! record that makes up channel history, and the [`ChannelState`] map that
//! represents a channel's current configuration at some point in its
//! event graph.
//!
//! No crate in the workspace depends on anything *except* `stratum-types`
//! for cross-cutting type definitions. This keeps the dependency graph
//! clean and prevents circular dependencies.

mod event;
mod id;
mod state;

pub use event::Event;
pub use id::{ChannelId, EventId, ParseIdError, UserId};
pub use state::{ChannelState, StateKey};
