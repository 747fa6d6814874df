//! The rule catalogue interface consumed by authorization and resolution.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use stratum_types::{ChannelState, Event, StateKey};

use crate::decision::AuthDecision;

/// Resolved state materialized as full events, so rules can read content
/// (power levels, membership values) rather than bare event ids.
pub type StateEvents = BTreeMap<StateKey, Event>;

/// Projects a [`StateEvents`] map down to the id-level [`ChannelState`].
pub fn state_ids(state: &StateEvents) -> ChannelState {
    ChannelState::from_entries(
        state
            .iter()
            .map(|(key, event)| (key.clone(), event.id.clone())),
    )
}

/// One predicate in the catalogue: accepts or rejects a candidate against
/// the state it extends. Rules must be pure — same inputs, same decision
/// on every server — or confluence breaks.
pub trait AuthRule: Send + Sync {
    /// Short identifier used in rejection logs.
    fn name(&self) -> &'static str;

    /// Evaluates the candidate against the given state.
    fn check(&self, candidate: &Event, state: &StateEvents) -> AuthDecision;
}

/// An ordered rule list plus the precedence comparator used when state
/// resolution must pick between conflicting candidates.
///
/// Supplied from outside the core so permission schemes can evolve
/// without touching the engine or the resolution algorithm.
pub trait RuleCatalog: Send + Sync {
    /// The rules, in evaluation order.
    fn rules(&self) -> &[Box<dyn AuthRule>];

    /// Compares two conflicting candidates by authority (e.g. the
    /// sender's power level at the evaluated state). `Greater` means `a`
    /// takes precedence over `b`. Must be a total, server-independent
    /// order over any candidate pair.
    fn precedence(&self, a: &Event, b: &Event, state: &StateEvents) -> Ordering;
}
