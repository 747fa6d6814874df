//! Wire types for the invite approval handshake.

use serde::{Deserialize, Serialize};
use stratum_types::Event;

/// The state context shipped alongside an invite candidate: every state
/// event constituting the channel state at the candidate's parents, in
/// full, ordered by (StateKey, depth, EventId).
///
/// Built once by [`build_approval_request`](crate::build_approval_request)
/// and never mutated afterwards; the fixed order lets the receiver
/// reconstruct the identical state deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteContext {
    pub state: Vec<Event>,
}

/// A candidate invite event plus the context the remote server needs to
/// authorize it without holding any of the channel's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteApprovalRequest {
    pub object: Event,
    pub context: InviteContext,
}

/// The remote server's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

/// Response body of the approval endpoint. `reason` carries a
/// machine-readable tag on rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Lifecycle of a tracked invite approval. `Pending` is the only
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteStatus {
    Pending,
    ApprovedRemote,
    RejectedRemote,
    TimedOut,
}

impl InviteStatus {
    /// Stable tag stored in the approval log.
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "PENDING",
            InviteStatus::ApprovedRemote => "APPROVED_REMOTE",
            InviteStatus::RejectedRemote => "REJECTED_REMOTE",
            InviteStatus::TimedOut => "TIMED_OUT",
        }
    }

    /// Parses a stored tag back into a status.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "PENDING" => Some(InviteStatus::Pending),
            "APPROVED_REMOTE" => Some(InviteStatus::ApprovedRemote),
            "REJECTED_REMOTE" => Some(InviteStatus::RejectedRemote),
            "TIMED_OUT" => Some(InviteStatus::TimedOut),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_response_wire_shape() {
        let approved = ApprovalResponse {
            decision: Decision::Approved,
            reason: None,
        };
        assert_eq!(
            serde_json::to_string(&approved).unwrap(),
            r#"{"decision":"approved"}"#
        );

        let rejected: ApprovalResponse =
            serde_json::from_str(r#"{"decision":"rejected","reason":"UNKNOWN_SENDER"}"#).unwrap();
        assert_eq!(rejected.decision, Decision::Rejected);
        assert_eq!(rejected.reason.as_deref(), Some("UNKNOWN_SENDER"));
    }

    #[test]
    fn status_tags_round_trip() {
        for status in [
            InviteStatus::Pending,
            InviteStatus::ApprovedRemote,
            InviteStatus::RejectedRemote,
            InviteStatus::TimedOut,
        ] {
            assert_eq!(InviteStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(InviteStatus::parse("BOGUS"), None);
    }
}
