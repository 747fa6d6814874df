//! Processing inbound approval requests.

use stratum_auth::{authorize, AuthDecision, RejectReason, RuleCatalog, StateEvents};

use crate::types::{ApprovalResponse, Decision, InviteApprovalRequest};

/// Decides an inbound approval request against the local rule catalogue.
///
/// The shipped context is validated before use: every context event must
/// be a state event with a consistent id, and no two may claim the same
/// StateKey. A request failing those checks is rejected as malformed —
/// never partially applied. Nothing here touches the store; the request
/// is authorized purely against the state it carries.
pub fn process_approval_request(
    request: &InviteApprovalRequest,
    catalog: &dyn RuleCatalog,
) -> ApprovalResponse {
    let mut state = StateEvents::new();
    for event in &request.context.state {
        if !event.id_is_consistent() || event.channel_id != request.object.channel_id {
            return reject(RejectReason::MalformedEvent);
        }
        let Some(key) = event.state_pair() else {
            return reject(RejectReason::MalformedEvent);
        };
        if state.insert(key, event.clone()).is_some() {
            // Duplicate StateKey: the context cannot reconstruct a single
            // coherent state.
            return reject(RejectReason::MalformedEvent);
        }
    }

    match authorize(&request.object, &state, catalog) {
        AuthDecision::Authorized => ApprovalResponse {
            decision: Decision::Approved,
            reason: None,
        },
        AuthDecision::Rejected(reason) => {
            tracing::debug!(
                event_id = request.object.id.as_str(),
                reason = reason.as_str(),
                "rejected inbound invite approval"
            );
            reject(reason)
        }
    }
}

fn reject(reason: RejectReason) -> ApprovalResponse {
    ApprovalResponse {
        decision: Decision::Rejected,
        reason: Some(reason.as_str().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stratum_auth::well_known::{
        CHANNEL_CREATE, CHANNEL_MEMBER, MEMBERSHIP_INVITE, MEMBERSHIP_JOIN,
    };
    use stratum_auth::DefaultCatalog;
    use stratum_types::{ChannelId, Event, UserId};

    use crate::types::InviteContext;

    fn channel() -> ChannelId {
        "!ops:example.org".parse().unwrap()
    }

    fn user(id: &str) -> UserId {
        id.parse().unwrap()
    }

    fn sample_request() -> InviteApprovalRequest {
        let genesis = Event::new(
            channel(),
            user("@alice:example.org"),
            CHANNEL_CREATE,
            Some(""),
            json!({"creator": "@alice:example.org"}),
            &[],
        );
        let join = Event::new(
            channel(),
            user("@alice:example.org"),
            CHANNEL_MEMBER,
            Some("@alice:example.org"),
            json!({"membership": MEMBERSHIP_JOIN}),
            &[&genesis],
        );
        let invite = Event::new(
            channel(),
            user("@alice:example.org"),
            CHANNEL_MEMBER,
            Some("@bob:remote.net"),
            json!({"membership": MEMBERSHIP_INVITE}),
            &[&join],
        );
        InviteApprovalRequest {
            object: invite,
            context: InviteContext {
                state: vec![genesis, join],
            },
        }
    }

    #[test]
    fn well_formed_invite_is_approved() {
        let response = process_approval_request(&sample_request(), &DefaultCatalog::default());
        assert_eq!(response.decision, Decision::Approved);
        assert_eq!(response.reason, None);
    }

    #[test]
    fn duplicate_state_key_is_rejected_as_malformed() {
        let mut request = sample_request();
        let duplicate = request.context.state[1].clone();
        request.context.state.push(duplicate);

        let response = process_approval_request(&request, &DefaultCatalog::default());
        assert_eq!(response.decision, Decision::Rejected);
        assert_eq!(response.reason.as_deref(), Some("MALFORMED_EVENT"));
    }

    #[test]
    fn tampered_context_event_is_rejected() {
        let mut request = sample_request();
        request.context.state[0].content = json!({"creator": "@mallory:example.org"});

        let response = process_approval_request(&request, &DefaultCatalog::default());
        assert_eq!(response.decision, Decision::Rejected);
        assert_eq!(response.reason.as_deref(), Some("MALFORMED_EVENT"));
    }

    #[test]
    fn unauthorized_invite_carries_reason_tag() {
        let mut request = sample_request();
        // Strip the sender's membership from the context: the inviter is
        // now an unknown sender.
        request.context.state.truncate(1);

        let response = process_approval_request(&request, &DefaultCatalog::default());
        assert_eq!(response.decision, Decision::Rejected);
        assert_eq!(response.reason.as_deref(), Some("UNKNOWN_SENDER"));
    }
}
