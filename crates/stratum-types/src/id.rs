//! Identifier types for channels, users, and events.
//!
//! Canonical string forms:
//!
//! | Type | Form | Example |
//! |------|------|---------|
//! | [`ChannelId`] | `!<localpart>:<domain>` | `!ops:example.org` |
//! | [`UserId`] | `@<localpart>:<domain>` | `@carol:example.org` |
//! | [`EventId`] | `$<64 hex chars>` | `$3f8a…` |
//!
//! Parsing via `FromStr` is the exact inverse of rendering via `Display`:
//! for every constructible identifier `x`, `x.to_string().parse() == Ok(x)`.
//! Equality is field equality, so two identifiers compare equal iff their
//! localpart and domain (or hash digits) are equal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when parsing an identifier from its string form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseIdError {
    /// The identifier does not start with the expected sigil character.
    #[error("identifier must start with '{0}'")]
    MissingSigil(char),

    /// The identifier has no `:` separating localpart from domain.
    #[error("identifier is missing the ':' domain separator")]
    MissingDomain,

    /// The localpart between sigil and `:` is empty.
    #[error("identifier localpart is empty")]
    EmptyLocalpart,

    /// The domain after `:` is empty.
    #[error("identifier domain is empty")]
    EmptyDomain,

    /// The domain contains a character outside `[A-Za-z0-9.:-]`.
    #[error("identifier domain contains invalid character '{0}'")]
    InvalidDomainChar(char),

    /// An event id is not `$` followed by 64 lowercase hex characters.
    #[error("event id must be '$' followed by 64 lowercase hex characters")]
    InvalidEventId,
}

/// Validates a domain: non-empty, restricted to `[A-Za-z0-9.-]` plus an
/// optional `:port` suffix handled by the caller's split.
fn check_domain(domain: &str) -> Result<(), ParseIdError> {
    if domain.is_empty() {
        return Err(ParseIdError::EmptyDomain);
    }
    for c in domain.chars() {
        if !(c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == ':') {
            return Err(ParseIdError::InvalidDomainChar(c));
        }
    }
    Ok(())
}

/// Splits `!local:domain`-shaped input into `(localpart, domain)`.
///
/// The localpart may not contain `:`; anything after the first `:` is the
/// domain (which may itself carry a `:port`).
fn split_sigil_form(value: &str, sigil: char) -> Result<(&str, &str), ParseIdError> {
    let rest = value
        .strip_prefix(sigil)
        .ok_or(ParseIdError::MissingSigil(sigil))?;
    let (localpart, domain) = rest.split_once(':').ok_or(ParseIdError::MissingDomain)?;
    if localpart.is_empty() {
        return Err(ParseIdError::EmptyLocalpart);
    }
    check_domain(domain)?;
    Ok((localpart, domain))
}

macro_rules! sigil_id {
    ($name:ident, $sigil:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(try_from = "String", into = "String")]
        pub struct $name {
            localpart: String,
            domain: String,
        }

        impl $name {
            /// Builds an identifier from its two parts.
            ///
            /// # Errors
            ///
            /// Returns `ParseIdError` if either part is empty, the
            /// localpart contains `:`, or the domain contains a character
            /// outside its allowed set.
            pub fn new(localpart: &str, domain: &str) -> Result<Self, ParseIdError> {
                if localpart.is_empty() {
                    return Err(ParseIdError::EmptyLocalpart);
                }
                if localpart.contains(':') {
                    return Err(ParseIdError::MissingDomain);
                }
                check_domain(domain)?;
                Ok(Self {
                    localpart: localpart.to_string(),
                    domain: domain.to_string(),
                })
            }

            /// The part before the `:`.
            pub fn localpart(&self) -> &str {
                &self.localpart
            }

            /// The origin domain after the `:`.
            pub fn domain(&self) -> &str {
                &self.domain
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}:{}", $sigil, self.localpart, self.domain)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let (localpart, domain) = split_sigil_form(value, $sigil)?;
                Ok(Self {
                    localpart: localpart.to_string(),
                    domain: domain.to_string(),
                })
            }
        }

        impl TryFrom<String> for $name {
            type Error = ParseIdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.to_string()
            }
        }
    };
}

sigil_id!(
    ChannelId,
    '!',
    "Opaque channel identifier: a local part plus the origin domain, rendered `!<localpart>:<domain>`."
);

sigil_id!(
    UserId,
    '@',
    "User identifier: a local part plus the hosting domain, rendered `@<localpart>:<domain>`."
);

/// Content-derived event identifier: `$` followed by the lowercase hex
/// SHA-256 of the event's hashable fields.
///
/// Event ids are unique within a channel and immutable once assigned.
/// `Ord` is lexicographic over the canonical string, which is the
/// tie-break order used by state resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventId(String);

impl EventId {
    /// Derives an event id from the canonical byte encoding of an event.
    pub fn from_content(bytes: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(bytes);
        Self(format!("${}", hex::encode(digest)))
    }

    /// The canonical `$<hex>` form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EventId {
    type Err = ParseIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let hex_part = value.strip_prefix('$').ok_or(ParseIdError::InvalidEventId)?;
        if hex_part.len() != 64
            || !hex_part
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(ParseIdError::InvalidEventId);
        }
        Ok(Self(value.to_string()))
    }
}

impl TryFrom<String> for EventId {
    type Error = ParseIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EventId> for String {
    fn from(value: EventId) -> String {
        value.0
    }
}
