//! Identifier translation between the native Stratum namespace and the
//! foreign federation protocol.
//!
//! The foreign protocol uses the same delimiter syntax as the native one
//! (`!local:domain` for channels, `@local:domain` for users, `$hex` for
//! events) but restricts localpart characters to `[a-z0-9._-]`. The native
//! namespace is a superset, so the forward mapping escapes every
//! disallowed byte and the reverse mapping applies the exact inverse.
//!
//! The mapper is pure and stateless. Its one guarantee is round-trip
//! identity: `from_foreign(to_foreign(x)) == x` for every identifier this
//! server can produce. Translation participates in identity equality
//! checks across servers, so the reverse direction never guesses — an
//! ill-formed or non-canonical escape fails with
//! [`MapError::MalformedIdentifier`].

mod escape;
mod mapper;

pub use escape::{escape_localpart, unescape_localpart};
pub use mapper::{
    from_foreign_channel, from_foreign_event, from_foreign_user, to_foreign_channel,
    to_foreign_event, to_foreign_user, ForeignChannelRef, ForeignEventRef, ForeignUserRef,
    MapError,
};
