//! The baseline rule catalogue.
//!
//! These rules define the *framework* defaults: structural
//! well-formedness, channel creation, membership preconditions, and
//! power-level sufficiency. Deployments with richer permission schemes
//! supply their own [`RuleCatalog`]; everything in this module is
//! replaceable without touching the engine or the resolver.

use std::cmp::Ordering;

use stratum_types::{Event, StateKey, UserId};

use crate::catalog::{AuthRule, RuleCatalog, StateEvents};
use crate::decision::{AuthDecision, RejectReason};
use crate::well_known::{
    CHANNEL_CREATE, CHANNEL_MEMBER, CHANNEL_POWER, MEMBERSHIP_INVITE, MEMBERSHIP_JOIN,
    MEMBERSHIP_LEAVE,
};

const DEFAULT_CREATOR_POWER: i64 = 100;
const DEFAULT_USERS_POWER: i64 = 0;
const DEFAULT_STATE_POWER: i64 = 50;
const DEFAULT_EVENTS_POWER: i64 = 0;
const DEFAULT_INVITE_POWER: i64 = 0;
const DEFAULT_KICK_POWER: i64 = 50;

/// The creation event in `state`, if present.
fn create_event(state: &StateEvents) -> Option<&Event> {
    state.get(&StateKey::new(CHANNEL_CREATE, ""))
}

/// The power-level configuration event in `state`, if present.
fn power_event(state: &StateEvents) -> Option<&Event> {
    state.get(&StateKey::new(CHANNEL_POWER, ""))
}

/// The membership value (`join` / `invite` / `leave`) of `user` in
/// `state`, if the user has any membership record at all.
fn membership_of(state: &StateEvents, user: &UserId) -> Option<String> {
    state
        .get(&StateKey::new(CHANNEL_MEMBER, &user.to_string()))
        .and_then(|event| event.content.get("membership"))
        .and_then(|value| value.as_str())
        .map(str::to_string)
}

/// The power level of `user` at `state`.
///
/// With a power event present, the `users` map decides, falling back to
/// `users_default`. Without one, the channel creator holds
/// [`DEFAULT_CREATOR_POWER`] and everyone else
/// [`DEFAULT_USERS_POWER`].
pub fn sender_power(state: &StateEvents, user: &UserId) -> i64 {
    match power_event(state) {
        Some(power) => {
            let users_default = power
                .content
                .get("users_default")
                .and_then(|v| v.as_i64())
                .unwrap_or(DEFAULT_USERS_POWER);
            power
                .content
                .get("users")
                .and_then(|users| users.get(user.to_string()))
                .and_then(|v| v.as_i64())
                .unwrap_or(users_default)
        }
        None => match create_event(state) {
            Some(create) if &create.sender == user => DEFAULT_CREATOR_POWER,
            _ => DEFAULT_USERS_POWER,
        },
    }
}

/// The power level `candidate` requires of its sender at `state`.
fn required_power(candidate: &Event, state: &StateEvents) -> i64 {
    let power = power_event(state);

    let configured = |field: &str, default: i64| -> i64 {
        power
            .and_then(|p| p.content.get(field))
            .and_then(|v| v.as_i64())
            .unwrap_or(default)
    };

    if candidate.event_type == CHANNEL_MEMBER {
        let membership = candidate
            .content
            .get("membership")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let is_kick = membership == MEMBERSHIP_LEAVE
            && candidate.state_key.as_deref() != Some(&candidate.sender.to_string());
        return match membership {
            MEMBERSHIP_INVITE => configured("invite", DEFAULT_INVITE_POWER),
            MEMBERSHIP_LEAVE if is_kick => configured("kick", DEFAULT_KICK_POWER),
            _ => 0,
        };
    }

    let per_type = power
        .and_then(|p| p.content.get("events"))
        .and_then(|events| events.get(&candidate.event_type))
        .and_then(|v| v.as_i64());

    match per_type {
        Some(level) => level,
        None if candidate.is_state() => configured("state_default", DEFAULT_STATE_POWER),
        None => configured("events_default", DEFAULT_EVENTS_POWER),
    }
}

/// Structural well-formedness: field shape, id integrity, parent/depth
/// consistency.
struct StructureRule;

impl AuthRule for StructureRule {
    fn name(&self) -> &'static str {
        "structure"
    }

    fn check(&self, candidate: &Event, _state: &StateEvents) -> AuthDecision {
        use AuthDecision::Rejected;
        use RejectReason::MalformedEvent;

        if candidate.event_type.is_empty() {
            return Rejected(MalformedEvent);
        }
        if !candidate.id_is_consistent() {
            return Rejected(MalformedEvent);
        }
        if (candidate.depth == 0) != candidate.parents.is_empty() {
            return Rejected(MalformedEvent);
        }
        if candidate.parents.contains(&candidate.id) {
            return Rejected(MalformedEvent);
        }

        match candidate.event_type.as_str() {
            CHANNEL_CREATE => {
                if candidate.state_key.as_deref() != Some("") || candidate.depth != 0 {
                    return Rejected(MalformedEvent);
                }
            }
            CHANNEL_MEMBER => {
                let target_ok = candidate
                    .state_key
                    .as_deref()
                    .map(|key| key.parse::<UserId>().is_ok())
                    .unwrap_or(false);
                let membership_ok = matches!(
                    candidate.content.get("membership").and_then(|v| v.as_str()),
                    Some(MEMBERSHIP_JOIN) | Some(MEMBERSHIP_INVITE) | Some(MEMBERSHIP_LEAVE)
                );
                if !target_ok || !membership_ok {
                    return Rejected(MalformedEvent);
                }
            }
            _ => {}
        }

        AuthDecision::Authorized
    }
}

/// Channel creation: exactly one creation event, authored on the
/// channel's own origin domain; everything else requires the channel to
/// exist.
struct CreationRule;

impl AuthRule for CreationRule {
    fn name(&self) -> &'static str {
        "creation"
    }

    fn check(&self, candidate: &Event, state: &StateEvents) -> AuthDecision {
        if candidate.event_type == CHANNEL_CREATE {
            if create_event(state).is_some() {
                return AuthDecision::Rejected(RejectReason::StructuralViolation);
            }
            if candidate.sender.domain() != candidate.channel_id.domain() {
                return AuthDecision::Rejected(RejectReason::MalformedEvent);
            }
            return AuthDecision::Authorized;
        }

        // No creation event reachable from the candidate's parents: its
        // ancestry does not contain the channel genesis.
        if create_event(state).is_none() {
            return AuthDecision::Rejected(RejectReason::MissingParent);
        }
        AuthDecision::Authorized
    }
}

/// Membership preconditions: senders must be joined (or hold standing
/// appropriate to the action), invites target non-members, and users
/// join only themselves.
struct MembershipRule;

impl MembershipRule {
    fn check_member_event(
        &self,
        candidate: &Event,
        state: &StateEvents,
        sender_membership: Option<&str>,
    ) -> AuthDecision {
        use AuthDecision::{Authorized, Rejected};
        use RejectReason::{InsufficientPermission, StructuralViolation, UnknownSender};

        // Validated by StructureRule; a parse failure here means the
        // catalogue was reordered, which MalformedEvent reports safely.
        let target: UserId = match candidate.state_key.as_deref().unwrap_or_default().parse() {
            Ok(target) => target,
            Err(_) => return Rejected(RejectReason::MalformedEvent),
        };
        let membership = candidate
            .content
            .get("membership")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let target_membership = membership_of(state, &target);
        let is_creator = create_event(state)
            .map(|create| create.sender == candidate.sender)
            .unwrap_or(false);

        match membership {
            MEMBERSHIP_JOIN => {
                if target != candidate.sender {
                    // Nobody joins on another user's behalf.
                    return Rejected(StructuralViolation);
                }
                match sender_membership {
                    Some(MEMBERSHIP_JOIN) | Some(MEMBERSHIP_INVITE) => Authorized,
                    _ if is_creator => Authorized,
                    None => Rejected(UnknownSender),
                    Some(_) => Rejected(InsufficientPermission),
                }
            }
            MEMBERSHIP_INVITE => {
                match sender_membership {
                    Some(MEMBERSHIP_JOIN) => {}
                    None => return Rejected(UnknownSender),
                    Some(_) => return Rejected(InsufficientPermission),
                }
                if target_membership.as_deref() == Some(MEMBERSHIP_JOIN) {
                    return Rejected(StructuralViolation);
                }
                Authorized
            }
            MEMBERSHIP_LEAVE => {
                if target == candidate.sender {
                    return match sender_membership {
                        Some(MEMBERSHIP_JOIN) | Some(MEMBERSHIP_INVITE) => Authorized,
                        None => Rejected(UnknownSender),
                        Some(_) => Rejected(InsufficientPermission),
                    };
                }
                // A kick: the sender must be joined and the target must
                // have standing to lose.
                match sender_membership {
                    Some(MEMBERSHIP_JOIN) => {}
                    None => return Rejected(UnknownSender),
                    Some(_) => return Rejected(InsufficientPermission),
                }
                if target_membership.is_none() {
                    return Rejected(StructuralViolation);
                }
                Authorized
            }
            _ => Rejected(RejectReason::MalformedEvent),
        }
    }
}

impl AuthRule for MembershipRule {
    fn name(&self) -> &'static str {
        "membership"
    }

    fn check(&self, candidate: &Event, state: &StateEvents) -> AuthDecision {
        if candidate.event_type == CHANNEL_CREATE {
            return AuthDecision::Authorized;
        }

        let sender_membership = membership_of(state, &candidate.sender);

        if candidate.event_type == CHANNEL_MEMBER {
            return self.check_member_event(candidate, state, sender_membership.as_deref());
        }

        match sender_membership.as_deref() {
            Some(MEMBERSHIP_JOIN) => AuthDecision::Authorized,
            None => AuthDecision::Rejected(RejectReason::UnknownSender),
            Some(_) => AuthDecision::Rejected(RejectReason::InsufficientPermission),
        }
    }
}

/// Power-level sufficiency for the action the candidate performs.
struct PowerRule;

impl AuthRule for PowerRule {
    fn name(&self) -> &'static str {
        "power"
    }

    fn check(&self, candidate: &Event, state: &StateEvents) -> AuthDecision {
        if candidate.event_type == CHANNEL_CREATE {
            return AuthDecision::Authorized;
        }
        let required = required_power(candidate, state);
        let held = sender_power(state, &candidate.sender);
        if held < required {
            return AuthDecision::Rejected(RejectReason::InsufficientPermission);
        }
        AuthDecision::Authorized
    }
}

/// The baseline catalogue: structure, creation, membership, power — in
/// that order. Precedence between conflicting candidates is the sender's
/// power level at the evaluated state.
pub struct DefaultCatalog {
    rules: Vec<Box<dyn AuthRule>>,
}

impl Default for DefaultCatalog {
    fn default() -> Self {
        Self {
            rules: vec![
                Box::new(StructureRule),
                Box::new(CreationRule),
                Box::new(MembershipRule),
                Box::new(PowerRule),
            ],
        }
    }
}

impl RuleCatalog for DefaultCatalog {
    fn rules(&self) -> &[Box<dyn AuthRule>] {
        &self.rules
    }

    fn precedence(&self, a: &Event, b: &Event, state: &StateEvents) -> Ordering {
        sender_power(state, &a.sender).cmp(&sender_power(state, &b.sender))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::authorize;
    use crate::well_known::CHANNEL_MESSAGE;
    use serde_json::json;
    use stratum_types::ChannelId;

    fn channel() -> ChannelId {
        "!ops:example.org".parse().unwrap()
    }

    fn user(localpart: &str) -> UserId {
        format!("@{localpart}:example.org").parse().unwrap()
    }

    fn create() -> Event {
        Event::new(
            channel(),
            user("alice"),
            CHANNEL_CREATE,
            Some(""),
            json!({"creator": "@alice:example.org"}),
            &[],
        )
    }

    fn member(sender: &UserId, target: &UserId, membership: &str, parents: &[&Event]) -> Event {
        Event::new(
            channel(),
            sender.clone(),
            CHANNEL_MEMBER,
            Some(&target.to_string()),
            json!({"membership": membership}),
            parents,
        )
    }

    fn state_of(events: &[&Event]) -> StateEvents {
        events
            .iter()
            .filter_map(|e| e.state_pair().map(|key| (key, (*e).clone())))
            .collect()
    }

    fn catalog() -> DefaultCatalog {
        DefaultCatalog::default()
    }

    #[test]
    fn create_bootstraps_empty_channel() {
        let decision = authorize(&create(), &StateEvents::new(), &catalog());
        assert!(decision.is_authorized());
    }

    #[test]
    fn second_create_is_structural_violation() {
        let first = create();
        let state = state_of(&[&first]);
        let second = Event::new(
            channel(),
            user("alice"),
            CHANNEL_CREATE,
            Some(""),
            json!({"creator": "@alice:example.org", "again": true}),
            &[],
        );
        assert_eq!(
            authorize(&second, &state, &catalog()),
            AuthDecision::Rejected(RejectReason::StructuralViolation)
        );
    }

    #[test]
    fn event_without_reachable_genesis_is_missing_parent() {
        let message = Event::new(
            channel(),
            user("alice"),
            CHANNEL_MESSAGE,
            None,
            json!({"body": "hello?"}),
            &[],
        );
        assert_eq!(
            authorize(&message, &StateEvents::new(), &catalog()),
            AuthDecision::Rejected(RejectReason::MissingParent)
        );
    }

    #[test]
    fn create_from_wrong_domain_is_malformed() {
        let bad = Event::new(
            channel(),
            "@eve:other.net".parse().unwrap(),
            CHANNEL_CREATE,
            Some(""),
            json!({}),
            &[],
        );
        assert_eq!(
            authorize(&bad, &StateEvents::new(), &catalog()),
            AuthDecision::Rejected(RejectReason::MalformedEvent)
        );
    }

    #[test]
    fn tampered_event_is_malformed() {
        let mut event = create();
        event.content = json!({"creator": "@mallory:example.org"});
        assert_eq!(
            authorize(&event, &StateEvents::new(), &catalog()),
            AuthDecision::Rejected(RejectReason::MalformedEvent)
        );
    }

    #[test]
    fn creator_joins_without_prior_membership() {
        let genesis = create();
        let state = state_of(&[&genesis]);
        let join = member(&user("alice"), &user("alice"), MEMBERSHIP_JOIN, &[&genesis]);
        assert!(authorize(&join, &state, &catalog()).is_authorized());
    }

    #[test]
    fn stranger_cannot_join_uninvited() {
        let genesis = create();
        let state = state_of(&[&genesis]);
        let join = member(&user("bob"), &user("bob"), MEMBERSHIP_JOIN, &[&genesis]);
        assert_eq!(
            authorize(&join, &state, &catalog()),
            AuthDecision::Rejected(RejectReason::UnknownSender)
        );
    }

    #[test]
    fn join_after_invite_is_authorized() {
        let genesis = create();
        let alice_join = member(&user("alice"), &user("alice"), MEMBERSHIP_JOIN, &[&genesis]);
        let invite = member(&user("alice"), &user("bob"), MEMBERSHIP_INVITE, &[&alice_join]);
        let state = state_of(&[&genesis, &alice_join, &invite]);

        let join = member(&user("bob"), &user("bob"), MEMBERSHIP_JOIN, &[&invite]);
        assert!(authorize(&join, &state, &catalog()).is_authorized());
    }

    #[test]
    fn invite_requires_joined_sender() {
        let genesis = create();
        let state = state_of(&[&genesis]);
        let invite = member(&user("bob"), &user("carol"), MEMBERSHIP_INVITE, &[&genesis]);
        assert_eq!(
            authorize(&invite, &state, &catalog()),
            AuthDecision::Rejected(RejectReason::UnknownSender)
        );
    }

    #[test]
    fn invite_to_joined_user_is_structural_violation() {
        let genesis = create();
        let alice_join = member(&user("alice"), &user("alice"), MEMBERSHIP_JOIN, &[&genesis]);
        let state = state_of(&[&genesis, &alice_join]);

        let invite = member(&user("alice"), &user("alice"), MEMBERSHIP_INVITE, &[&alice_join]);
        assert_eq!(
            authorize(&invite, &state, &catalog()),
            AuthDecision::Rejected(RejectReason::StructuralViolation)
        );
    }

    #[test]
    fn message_from_unknown_sender_is_rejected() {
        let genesis = create();
        let state = state_of(&[&genesis]);
        let message = Event::new(
            channel(),
            user("bob"),
            CHANNEL_MESSAGE,
            None,
            json!({"body": "hi"}),
            &[&genesis],
        );
        assert_eq!(
            authorize(&message, &state, &catalog()),
            AuthDecision::Rejected(RejectReason::UnknownSender)
        );
    }

    #[test]
    fn state_event_requires_default_power() {
        let genesis = create();
        let alice_join = member(&user("alice"), &user("alice"), MEMBERSHIP_JOIN, &[&genesis]);
        let invite = member(&user("alice"), &user("bob"), MEMBERSHIP_INVITE, &[&alice_join]);
        let bob_join = member(&user("bob"), &user("bob"), MEMBERSHIP_JOIN, &[&invite]);
        let state = state_of(&[&genesis, &alice_join, &bob_join]);

        let topic = |sender: &UserId, parents: &[&Event]| {
            Event::new(
                channel(),
                sender.clone(),
                "channel.topic",
                Some(""),
                json!({"topic": "deploys"}),
                parents,
            )
        };

        // Bob holds users_default (0) < state_default (50).
        assert_eq!(
            authorize(&topic(&user("bob"), &[&bob_join]), &state, &catalog()),
            AuthDecision::Rejected(RejectReason::InsufficientPermission)
        );
        // The creator holds 100 without any power event.
        assert!(authorize(&topic(&user("alice"), &[&bob_join]), &state, &catalog()).is_authorized());
    }

    #[test]
    fn power_event_grants_level() {
        let genesis = create();
        let alice_join = member(&user("alice"), &user("alice"), MEMBERSHIP_JOIN, &[&genesis]);
        let invite = member(&user("alice"), &user("bob"), MEMBERSHIP_INVITE, &[&alice_join]);
        let bob_join = member(&user("bob"), &user("bob"), MEMBERSHIP_JOIN, &[&invite]);
        let power = Event::new(
            channel(),
            user("alice"),
            CHANNEL_POWER,
            Some(""),
            json!({"users": {"@alice:example.org": 100, "@bob:example.org": 50}}),
            &[&bob_join],
        );
        let state = state_of(&[&genesis, &alice_join, &bob_join, &power]);

        let topic = Event::new(
            channel(),
            user("bob"),
            "channel.topic",
            Some(""),
            json!({"topic": "now allowed"}),
            &[&power],
        );
        assert!(authorize(&topic, &state, &catalog()).is_authorized());
    }

    #[test]
    fn kick_requires_kick_power() {
        let genesis = create();
        let alice_join = member(&user("alice"), &user("alice"), MEMBERSHIP_JOIN, &[&genesis]);
        let invite = member(&user("alice"), &user("bob"), MEMBERSHIP_INVITE, &[&alice_join]);
        let bob_join = member(&user("bob"), &user("bob"), MEMBERSHIP_JOIN, &[&invite]);
        let state = state_of(&[&genesis, &alice_join, &bob_join]);

        // Bob (power 0) cannot kick Alice.
        let kick = member(&user("bob"), &user("alice"), MEMBERSHIP_LEAVE, &[&bob_join]);
        assert_eq!(
            authorize(&kick, &state, &catalog()),
            AuthDecision::Rejected(RejectReason::InsufficientPermission)
        );

        // Alice (creator, 100) can kick Bob.
        let kick = member(&user("alice"), &user("bob"), MEMBERSHIP_LEAVE, &[&bob_join]);
        assert!(authorize(&kick, &state, &catalog()).is_authorized());
    }

    #[test]
    fn precedence_orders_by_sender_power() {
        let genesis = create();
        let alice_join = member(&user("alice"), &user("alice"), MEMBERSHIP_JOIN, &[&genesis]);
        let invite = member(&user("alice"), &user("bob"), MEMBERSHIP_INVITE, &[&alice_join]);
        let bob_join = member(&user("bob"), &user("bob"), MEMBERSHIP_JOIN, &[&invite]);
        let state = state_of(&[&genesis, &alice_join, &bob_join]);

        let from_alice = Event::new(
            channel(),
            user("alice"),
            "channel.topic",
            Some(""),
            json!({"topic": "a"}),
            &[&bob_join],
        );
        let from_bob = Event::new(
            channel(),
            user("bob"),
            "channel.topic",
            Some(""),
            json!({"topic": "b"}),
            &[&bob_join],
        );

        assert_eq!(
            catalog().precedence(&from_alice, &from_bob, &state),
            Ordering::Greater
        );
        assert_eq!(
            catalog().precedence(&from_bob, &from_alice, &state),
            Ordering::Less
        );
        assert_eq!(
            catalog().precedence(&from_bob, &from_bob, &state),
            Ordering::Equal
        );
    }
}
