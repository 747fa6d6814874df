//! Typed foreign references and the translation operations.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use stratum_types::{ChannelId, EventId, UserId};

use crate::escape::{escape_localpart, unescape_localpart};

/// Errors produced by identifier translation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    /// The input does not round-trip: bad sigil, charset violation,
    /// ill-formed escape sequence, or invalid decoded identifier.
    #[error("malformed identifier: {0}")]
    MalformedIdentifier(String),
}

macro_rules! foreign_ref {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw wire string without validation. Validation
            /// happens in the corresponding `from_foreign_*` call.
            pub fn new(raw: &str) -> Self {
                Self(raw.to_string())
            }

            /// The wire form.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

foreign_ref!(
    ForeignChannelRef,
    "A channel reference in the foreign namespace: `!<escaped-localpart>:<domain>`."
);
foreign_ref!(
    ForeignUserRef,
    "A user reference in the foreign namespace: `@<escaped-localpart>:<domain>`."
);
foreign_ref!(
    ForeignEventRef,
    "An event reference in the foreign namespace: `$<hex>` (hex is already within the foreign charset)."
);

/// Splits a `<sigil><localpart>:<domain>` foreign form into its parts.
fn split_foreign(raw: &str, sigil: char) -> Result<(&str, &str), MapError> {
    let rest = raw.strip_prefix(sigil).ok_or_else(|| {
        MapError::MalformedIdentifier(format!("'{raw}' is missing the '{sigil}' sigil"))
    })?;
    let (localpart, domain) = rest.split_once(':').ok_or_else(|| {
        MapError::MalformedIdentifier(format!("'{raw}' is missing the ':' domain separator"))
    })?;
    Ok((localpart, domain))
}

/// Translates a native channel id into the foreign namespace.
pub fn to_foreign_channel(id: &ChannelId) -> ForeignChannelRef {
    ForeignChannelRef(format!(
        "!{}:{}",
        escape_localpart(id.localpart()),
        id.domain()
    ))
}

/// Translates a foreign channel reference back into the native namespace.
///
/// # Errors
///
/// Returns [`MapError::MalformedIdentifier`] if the reference has the
/// wrong shape, an ill-formed escape, or unescapes to an invalid native
/// channel id.
pub fn from_foreign_channel(foreign: &ForeignChannelRef) -> Result<ChannelId, MapError> {
    let (localpart, domain) = split_foreign(&foreign.0, '!')?;
    let localpart = unescape_localpart(localpart)?;
    ChannelId::new(&localpart, domain)
        .map_err(|e| MapError::MalformedIdentifier(format!("'{foreign}': {e}")))
}

/// Translates a native user id into the foreign namespace.
pub fn to_foreign_user(id: &UserId) -> ForeignUserRef {
    ForeignUserRef(format!(
        "@{}:{}",
        escape_localpart(id.localpart()),
        id.domain()
    ))
}

/// Translates a foreign user reference back into the native namespace.
///
/// # Errors
///
/// Same failure modes as [`from_foreign_channel`].
pub fn from_foreign_user(foreign: &ForeignUserRef) -> Result<UserId, MapError> {
    let (localpart, domain) = split_foreign(&foreign.0, '@')?;
    let localpart = unescape_localpart(localpart)?;
    UserId::new(&localpart, domain)
        .map_err(|e| MapError::MalformedIdentifier(format!("'{foreign}': {e}")))
}

/// Translates a native event id into the foreign namespace.
///
/// Event ids are `$` plus lowercase hex, which lies entirely within the
/// foreign charset, so the wire form is textually identical — but the
/// type changes namespace, keeping the two schemes apart at compile time.
pub fn to_foreign_event(id: &EventId) -> ForeignEventRef {
    ForeignEventRef(id.as_str().to_string())
}

/// Translates a foreign event reference back into the native namespace.
///
/// # Errors
///
/// Returns [`MapError::MalformedIdentifier`] if the reference is not a
/// valid `$<hex>` event id.
pub fn from_foreign_event(foreign: &ForeignEventRef) -> Result<EventId, MapError> {
    EventId::from_str(&foreign.0)
        .map_err(|e| MapError::MalformedIdentifier(format!("'{foreign}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_round_trip_identity() {
        let id = ChannelId::new("a", "example.org").unwrap();
        assert_eq!(id.to_string(), "!a:example.org");

        let foreign = to_foreign_channel(&id);
        let back = from_foreign_channel(&foreign).unwrap();
        assert_eq!(back, id);
        assert_eq!(back.to_string(), "!a:example.org");
    }

    #[test]
    fn channel_with_disallowed_characters_round_trips() {
        let id = ChannelId::new("Ops Room#1", "example.org").unwrap();
        let foreign = to_foreign_channel(&id);
        assert_eq!(foreign.as_str(), "!%4Fps%20%52oom%231:example.org");
        assert_eq!(from_foreign_channel(&foreign).unwrap(), id);
    }

    #[test]
    fn user_round_trip_identity() {
        let id = UserId::new("Carol_Émile", "example.org").unwrap();
        let foreign = to_foreign_user(&id);
        assert_eq!(from_foreign_user(&foreign).unwrap(), id);
    }

    #[test]
    fn event_round_trip_identity() {
        let id = EventId::from_content(b"payload");
        let foreign = to_foreign_event(&id);
        assert_eq!(foreign.as_str(), id.as_str());
        assert_eq!(from_foreign_event(&foreign).unwrap(), id);
    }

    #[test]
    fn foreign_bad_escape_is_malformed() {
        let foreign = ForeignChannelRef::new("!bad%zz:example.org");
        assert!(matches!(
            from_foreign_channel(&foreign),
            Err(MapError::MalformedIdentifier(_))
        ));
    }

    #[test]
    fn foreign_wrong_sigil_is_malformed() {
        let foreign = ForeignUserRef::new("!not-a-user:example.org");
        assert!(from_foreign_user(&foreign).is_err());
    }

    #[test]
    fn foreign_missing_domain_is_malformed() {
        let foreign = ForeignChannelRef::new("!nodomain");
        assert!(from_foreign_channel(&foreign).is_err());
    }

    #[test]
    fn foreign_event_with_bad_hex_is_malformed() {
        let foreign = ForeignEventRef::new("$NOTHEX");
        assert!(from_foreign_event(&foreign).is_err());
    }

    #[test]
    fn well_formed_foreign_input_remaps_consistently() {
        // A foreign-origin value within our rules maps to a native value
        // whose forward mapping reproduces the same foreign form.
        let foreign = ForeignChannelRef::new("!ops%20room:example.org");
        let native = from_foreign_channel(&foreign).unwrap();
        assert_eq!(to_foreign_channel(&native), foreign);
    }
}
