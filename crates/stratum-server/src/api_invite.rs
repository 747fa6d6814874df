//! The inbound invite approval endpoint.

use std::sync::Arc;

use axum::extract::{Extension, Query};
use axum::Json;
use serde::Deserialize;

use stratum_federation::{
    process_approval_request, ApprovalResponse, InviteApprovalRequest, InviteContext,
};

use crate::api_events::{ApiError, NamespaceQuery, WireEvent};
use crate::AppState;

/// The untyped wire form of an approval request. Like the events
/// endpoint, identifiers are parsed into native types exactly once, here;
/// `?ns=foreign` routes them through the mapper first.
#[derive(Debug, Deserialize)]
pub struct WireApprovalRequest {
    pub object: WireEvent,
    pub context: WireContext,
}

#[derive(Debug, Deserialize)]
pub struct WireContext {
    #[serde(default)]
    pub state: Vec<WireEvent>,
}

impl WireApprovalRequest {
    fn into_request(self, foreign: bool) -> Result<InviteApprovalRequest, ApiError> {
        let object = self.object.into_event(foreign)?;
        let state = self
            .context
            .state
            .into_iter()
            .map(|event| event.into_event(foreign))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(InviteApprovalRequest {
            object,
            context: InviteContext { state },
        })
    }
}

/// `POST /api/federation/invite` — decides a remote server's invite
/// approval request against the local rule catalogue.
///
/// The decision is computed purely from the request's own state context;
/// no channel history is read or written, so a malformed or hostile
/// request can never touch the store. Both verdicts are a `200` — the
/// rejection is the payload, not a transport failure.
pub async fn approval_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(ns): Query<NamespaceQuery>,
    Json(wire): Json<WireApprovalRequest>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let request = wire.into_request(ns.is_foreign())?;
    let response = process_approval_request(&request, state.catalog.as_ref());
    tracing::info!(
        event_id = request.object.id.as_str(),
        channel_id = %request.object.channel_id,
        decision = ?response.decision,
        "decided inbound invite approval"
    );
    Ok(Json(response))
}
