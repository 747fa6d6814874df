//! The rule-running engine.

use stratum_types::Event;

use crate::catalog::{RuleCatalog, StateEvents};
use crate::decision::AuthDecision;

/// Evaluates a candidate event against the resolved state at its parents.
///
/// Runs every catalogue rule in order and short-circuits on the first
/// rejection; the returned reason identifies the failed precondition.
/// The same candidate evaluated against the same state yields the same
/// decision on every server, regardless of arrival order.
pub fn authorize(candidate: &Event, state: &StateEvents, catalog: &dyn RuleCatalog) -> AuthDecision {
    for rule in catalog.rules() {
        if let AuthDecision::Rejected(reason) = rule.check(candidate, state) {
            tracing::debug!(
                rule = rule.name(),
                reason = reason.as_str(),
                event_id = candidate.id.as_str(),
                event_type = %candidate.event_type,
                sender = %candidate.sender,
                "authorization rejected"
            );
            return AuthDecision::Rejected(reason);
        }
    }
    AuthDecision::Authorized
}
