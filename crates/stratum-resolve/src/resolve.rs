//! The resolution algorithm.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rusqlite::Connection;

use stratum_auth::{authorize, state_ids, RuleCatalog, StateEvents};
use stratum_types::{ChannelState, Event, EventId, StateKey};

use crate::error::ResolveError;

/// Resolves the canonical state reachable from the given forward
/// extremities.
///
/// Same stored event set in, same state out — independent of append order
/// and of which extremity is listed first.
pub fn resolve(
    conn: &Connection,
    extremities: &BTreeSet<EventId>,
    catalog: &dyn RuleCatalog,
) -> Result<ChannelState, ResolveError> {
    Ok(state_ids(&resolve_full(conn, extremities, catalog)?))
}

/// Like [`resolve`], but returns the full winning events rather than their
/// ids. The invite workflow serializes these into approval requests, since
/// the remote side may not hold this channel's history.
pub fn resolve_full(
    conn: &Connection,
    extremities: &BTreeSet<EventId>,
    catalog: &dyn RuleCatalog,
) -> Result<StateEvents, ResolveError> {
    let ancestry = collect_ancestry(conn, extremities)?;

    // Partition the reachable state events by key.
    let mut candidates: BTreeMap<StateKey, Vec<Event>> = BTreeMap::new();
    for event in ancestry.values() {
        if let Some(key) = event.state_pair() {
            candidates.entry(key).or_default().push(event.clone());
        }
    }

    let mut resolved = StateEvents::new();
    let mut conflicted: BTreeMap<StateKey, Vec<Event>> = BTreeMap::new();
    for (key, mut events) in candidates {
        if events.len() == 1 {
            if let Some(event) = events.pop() {
                resolved.insert(key, event);
            }
        } else {
            conflicted.insert(key, events);
        }
    }

    let conflicted_keys: BTreeSet<StateKey> = conflicted.keys().cloned().collect();

    // Conflicted keys are settled in StateKey order so every server walks
    // them identically.
    for (key, events) in conflicted {
        let mut survivors = Vec::with_capacity(events.len());
        for candidate in events {
            let context = context_for(&candidate, &resolved, &conflicted_keys, &ancestry);
            if authorize(&candidate, &context, catalog).is_authorized() {
                survivors.push(candidate);
            } else {
                tracing::debug!(
                    event_id = candidate.id.as_str(),
                    event_type = %candidate.event_type,
                    "conflicted candidate failed re-authorization"
                );
            }
        }

        if survivors.is_empty() {
            tracing::error!(
                event_type = %key.event_type,
                state_key = %key.state_key,
                "no conflicted candidate survives re-authorization"
            );
            return Err(ResolveError::UnresolvedConflict { key });
        }

        // Higher precedence wins; ties fall to greater depth, then to the
        // lexicographically smaller event id. The id step makes the order
        // total, so the winner is unique.
        survivors.sort_by(|a, b| {
            catalog
                .precedence(b, a, &resolved)
                .then_with(|| b.depth.cmp(&a.depth))
                .then_with(|| a.id.cmp(&b.id))
        });

        if let Some(winner) = survivors.into_iter().next() {
            resolved.insert(key, winner);
        }
    }

    Ok(resolved)
}

/// The resolved state at an event's parents — the state a candidate must
/// be authorized against, and the context shipped inside invite approval
/// requests.
pub fn state_at_parents(
    conn: &Connection,
    event: &Event,
    catalog: &dyn RuleCatalog,
) -> Result<StateEvents, ResolveError> {
    if event.parents.is_empty() {
        return Ok(StateEvents::new());
    }
    resolve_full(conn, &event.parents, catalog)
}

/// The partial state a conflicted candidate is re-authorized against:
/// the unconflicted keys (and any winners settled so far), overlaid for
/// every conflicted key with the value the candidate's own ancestry
/// carries — including the prior value of the candidate's own key. A
/// candidate is judged by the branch it actually extended.
fn context_for(
    candidate: &Event,
    resolved: &StateEvents,
    conflicted: &BTreeSet<StateKey>,
    ancestry: &BTreeMap<EventId, Event>,
) -> StateEvents {
    let mut context = resolved.clone();
    let own = ancestry_state(candidate, ancestry);
    for key in conflicted {
        if let Some(event) = own.get(key) {
            context.insert(key.clone(), event.clone());
        }
    }
    context
}

/// The state events visible from `candidate`'s parents, one per key. When
/// a key appears on more than one ancestor path the greater depth wins,
/// then the smaller event id — a structural rule, so the same value is
/// picked on every server.
fn ancestry_state(candidate: &Event, ancestry: &BTreeMap<EventId, Event>) -> StateEvents {
    let mut state = StateEvents::new();
    let mut visited: BTreeSet<EventId> = candidate.parents.clone();
    let mut queue: VecDeque<EventId> = candidate.parents.iter().cloned().collect();

    while let Some(id) = queue.pop_front() {
        let Some(event) = ancestry.get(&id) else {
            continue;
        };
        if let Some(key) = event.state_pair() {
            let supersedes = state
                .get(&key)
                .map(|held| event.depth > held.depth || (event.depth == held.depth && event.id < held.id))
                .unwrap_or(true);
            if supersedes {
                state.insert(key, event.clone());
            }
        }
        for parent in &event.parents {
            if visited.insert(parent.clone()) {
                queue.push_back(parent.clone());
            }
        }
    }

    state
}

/// Loads every event reachable from the extremities, the extremities
/// themselves included.
fn collect_ancestry(
    conn: &Connection,
    extremities: &BTreeSet<EventId>,
) -> Result<BTreeMap<EventId, Event>, ResolveError> {
    let mut events = BTreeMap::new();
    let mut queue: VecDeque<EventId> = extremities.iter().cloned().collect();

    while let Some(id) = queue.pop_front() {
        if events.contains_key(&id) {
            continue;
        }
        let event = stratum_store::get(conn, &id)?;
        for parent in &event.parents {
            if !events.contains_key(parent) {
                queue.push_back(parent.clone());
            }
        }
        events.insert(id, event);
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stratum_auth::well_known::{
        CHANNEL_CREATE, CHANNEL_MEMBER, CHANNEL_POWER, MEMBERSHIP_INVITE, MEMBERSHIP_JOIN,
    };
    use stratum_auth::DefaultCatalog;
    use stratum_db::run_migrations;
    use stratum_store::append;
    use stratum_types::{ChannelId, UserId};

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

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

    fn member(sender: &str, target: &str, membership: &str, parents: &[&Event]) -> Event {
        Event::new(
            channel(),
            user(sender),
            CHANNEL_MEMBER,
            Some(&user(target).to_string()),
            json!({"membership": membership}),
            parents,
        )
    }

    fn topic(sender: &str, text: &str, parents: &[&Event]) -> Event {
        Event::new(
            channel(),
            user(sender),
            "channel.topic",
            Some(""),
            json!({"topic": text}),
            parents,
        )
    }

    fn append_all(conn: &Connection, events: &[&Event]) {
        for event in events {
            append(conn, event).unwrap();
        }
    }

    fn tips(events: &[&Event]) -> BTreeSet<EventId> {
        events.iter().map(|e| e.id.clone()).collect()
    }

    fn key(event_type: &str, state_key: &str) -> StateKey {
        StateKey::new(event_type, state_key)
    }

    #[test]
    fn empty_extremities_resolve_to_empty_state() {
        let conn = conn();
        let state = resolve(&conn, &BTreeSet::new(), &DefaultCatalog::default()).unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn linear_history_resolves_to_latest_values() {
        let conn = conn();
        let genesis = create();
        let join = member("alice", "alice", MEMBERSHIP_JOIN, &[&genesis]);
        let t1 = topic("alice", "first", &[&join]);
        let t2 = topic("alice", "second", &[&t1]);
        append_all(&conn, &[&genesis, &join, &t1, &t2]);

        let state = resolve(&conn, &tips(&[&t2]), &DefaultCatalog::default()).unwrap();

        assert_eq!(state.get(&key(CHANNEL_CREATE, "")), Some(&genesis.id));
        assert_eq!(
            state.get(&key(CHANNEL_MEMBER, "@alice:example.org")),
            Some(&join.id)
        );
        assert_eq!(state.get(&key("channel.topic", "")), Some(&t2.id));
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn confluence_is_independent_of_append_order() {
        let genesis = create();
        let join = member("alice", "alice", MEMBERSHIP_JOIN, &[&genesis]);
        let t_a = topic("alice", "branch a", &[&join]);
        let t_b = topic("alice", "branch b", &[&join]);

        let first = conn();
        append_all(&first, &[&genesis, &join, &t_a, &t_b]);
        let second = conn();
        append_all(&second, &[&genesis, &join, &t_b, &t_a]);

        let catalog = DefaultCatalog::default();
        let from_first = resolve(&first, &tips(&[&t_a, &t_b]), &catalog).unwrap();
        let from_second = resolve(&second, &tips(&[&t_b, &t_a]), &catalog).unwrap();

        assert_eq!(from_first, from_second);

        // Same sender and depth on both branches: the smaller event id
        // holds the key.
        let expected = if t_a.id < t_b.id { &t_a } else { &t_b };
        assert_eq!(from_first.get(&key("channel.topic", "")), Some(&expected.id));
    }

    #[test]
    fn higher_precedence_beats_greater_depth() {
        let conn = conn();
        let genesis = create();
        let alice_join = member("alice", "alice", MEMBERSHIP_JOIN, &[&genesis]);
        let invite = member("alice", "bob", MEMBERSHIP_INVITE, &[&alice_join]);
        let bob_join = member("bob", "bob", MEMBERSHIP_JOIN, &[&invite]);
        let power = Event::new(
            channel(),
            user("alice"),
            CHANNEL_POWER,
            Some(""),
            json!({"users": {"@alice:example.org": 100, "@bob:example.org": 50}}),
            &[&bob_join],
        );
        // Bob's branch runs deeper than Alice's.
        let bob_t1 = topic("bob", "bob one", &[&power]);
        let bob_t2 = topic("bob", "bob two", &[&bob_t1]);
        let alice_t = topic("alice", "alice", &[&power]);
        append_all(
            &conn,
            &[&genesis, &alice_join, &invite, &bob_join, &power, &bob_t1, &bob_t2, &alice_t],
        );

        let state = resolve(&conn, &tips(&[&bob_t2, &alice_t]), &DefaultCatalog::default()).unwrap();
        assert_eq!(state.get(&key("channel.topic", "")), Some(&alice_t.id));
    }

    #[test]
    fn reauthorization_discards_unauthorized_candidates() {
        let conn = conn();
        let genesis = create();
        let alice_join = member("alice", "alice", MEMBERSHIP_JOIN, &[&genesis]);
        let invite = member("alice", "bob", MEMBERSHIP_INVITE, &[&alice_join]);
        let bob_join = member("bob", "bob", MEMBERSHIP_JOIN, &[&invite]);
        // Carol holds the highest power on paper but never joined.
        let power = Event::new(
            channel(),
            user("alice"),
            CHANNEL_POWER,
            Some(""),
            json!({"users": {
                "@alice:example.org": 100,
                "@bob:example.org": 50,
                "@carol:example.org": 100
            }}),
            &[&bob_join],
        );
        let bob_t = topic("bob", "from bob", &[&power]);
        let carol_t = topic("carol", "from carol", &[&power]);
        append_all(
            &conn,
            &[&genesis, &alice_join, &invite, &bob_join, &power, &bob_t, &carol_t],
        );

        let state = resolve(&conn, &tips(&[&bob_t, &carol_t]), &DefaultCatalog::default()).unwrap();
        // Carol's candidate fails re-authorization (unknown sender), so
        // Bob's wins despite the lower power level.
        assert_eq!(state.get(&key("channel.topic", "")), Some(&bob_t.id));
    }

    #[test]
    fn all_candidates_rejected_is_an_internal_error() {
        let conn = conn();
        let genesis = create();
        let alice_join = member("alice", "alice", MEMBERSHIP_JOIN, &[&genesis]);
        // Neither sender ever joined; both candidates fail re-authorization.
        let carol_t = topic("carol", "from carol", &[&alice_join]);
        let dan_t = topic("dan", "from dan", &[&alice_join]);
        append_all(&conn, &[&genesis, &alice_join, &carol_t, &dan_t]);

        let err = resolve(&conn, &tips(&[&carol_t, &dan_t]), &DefaultCatalog::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::UnresolvedConflict { key } if key == StateKey::new("channel.topic", "")
        ));
    }

    #[test]
    fn state_at_parents_reconstructs_prior_state() {
        let conn = conn();
        let genesis = create();
        let join = member("alice", "alice", MEMBERSHIP_JOIN, &[&genesis]);
        let t1 = topic("alice", "first", &[&join]);
        let t2 = topic("alice", "second", &[&t1]);
        append_all(&conn, &[&genesis, &join, &t1, &t2]);

        let catalog = DefaultCatalog::default();
        let at_t2 = state_at_parents(&conn, &t2, &catalog).unwrap();
        assert_eq!(
            at_t2.get(&key("channel.topic", "")).map(|e| &e.id),
            Some(&t1.id)
        );

        let at_genesis = state_at_parents(&conn, &genesis, &catalog).unwrap();
        assert!(at_genesis.is_empty());
    }

    #[test]
    fn resolution_keeps_one_event_per_key() {
        let conn = conn();
        let genesis = create();
        let join = member("alice", "alice", MEMBERSHIP_JOIN, &[&genesis]);
        let t_a = topic("alice", "a", &[&join]);
        let t_b = topic("alice", "b", &[&join]);
        let t_c = topic("alice", "c", &[&join]);
        append_all(&conn, &[&genesis, &join, &t_a, &t_b, &t_c]);

        let full = resolve_full(
            &conn,
            &tips(&[&t_a, &t_b, &t_c]),
            &DefaultCatalog::default(),
        )
        .unwrap();

        // One winner for the topic, with create and membership untouched.
        assert_eq!(full.len(), 3);
        assert!(full.contains_key(&StateKey::new("channel.topic", "")));
    }
}
