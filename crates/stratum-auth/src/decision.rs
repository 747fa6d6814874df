//! Authorization outcomes.

use serde::{Deserialize, Serialize};

/// The outcome of evaluating a candidate event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// Every rule in the catalogue passed.
    Authorized,
    /// A rule rejected the event. The event is simply not admitted;
    /// nothing about the channel changes.
    Rejected(RejectReason),
}

impl AuthDecision {
    /// Whether the decision admits the event.
    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthDecision::Authorized)
    }
}

/// Machine-readable rejection reasons, stable across servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    /// A declared parent is not present in the store.
    MissingParent,
    /// The sender lacks the power or membership standing the action needs.
    InsufficientPermission,
    /// The event is structurally ill-formed or its id does not match its
    /// content.
    MalformedEvent,
    /// The sender has no standing in the channel at all.
    UnknownSender,
    /// The event violates a graph or state-shape invariant (duplicate
    /// creation, invite to a joined user, kick of a non-member, …).
    StructuralViolation,
}

impl RejectReason {
    /// The stable wire tag for this reason.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingParent => "MISSING_PARENT",
            Self::InsufficientPermission => "INSUFFICIENT_PERMISSION",
            Self::MalformedEvent => "MALFORMED_EVENT",
            Self::UnknownSender => "UNKNOWN_SENDER",
            Self::StructuralViolation => "STRUCTURAL_VIOLATION",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_tags_match_serde_encoding() {
        for reason in [
            RejectReason::MissingParent,
            RejectReason::InsufficientPermission,
            RejectReason::MalformedEvent,
            RejectReason::UnknownSender,
            RejectReason::StructuralViolation,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.as_str()));
            let back: RejectReason = serde_json::from_str(&json).unwrap();
            assert_eq!(back, reason);
        }
    }
}
