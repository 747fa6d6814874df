//! Building outbound approval requests.

use rusqlite::Connection;

use stratum_auth::RuleCatalog;
use stratum_resolve::state_at_parents;
use stratum_types::Event;

use crate::error::FederationError;
use crate::types::{InviteApprovalRequest, InviteContext};

/// Packages an invite candidate with the full state context at its
/// parents.
///
/// Every state event is embedded whole — the remote server may not possess
/// this channel's history, so ids would be useless to it. The sequence is
/// ordered by (StateKey, depth, EventId) so the receiver reconstructs the
/// same state no matter which server built the request.
pub fn build_approval_request(
    conn: &Connection,
    invite: &Event,
    catalog: &dyn RuleCatalog,
) -> Result<InviteApprovalRequest, FederationError> {
    let state = state_at_parents(conn, invite, catalog)?;

    let mut events: Vec<Event> = state.into_values().collect();
    events.sort_by(|a, b| {
        a.state_pair()
            .cmp(&b.state_pair())
            .then_with(|| a.depth.cmp(&b.depth))
            .then_with(|| a.id.cmp(&b.id))
    });

    Ok(InviteApprovalRequest {
        object: invite.clone(),
        context: InviteContext { state: events },
    })
}
