//! Federation event ingest and retrieval endpoints.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use stratum_interop::{
    from_foreign_channel, from_foreign_event, from_foreign_user, ForeignChannelRef,
    ForeignEventRef, ForeignUserRef, MapError,
};
use stratum_store::{get, read_state_cache, StoreError};
use stratum_types::{ChannelId, Event, EventId, ParseIdError};

use crate::ingest::{ingest_event, IngestError, IngestOutcome};
use crate::AppState;

/// Errors surfaced by the HTTP layer. Recoverable ingest conditions are
/// encoded in the response body, not here.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl From<ParseIdError> for ApiError {
    fn from(err: ParseIdError) -> Self {
        ApiError::InvalidIdentifier(err.to_string())
    }
}

impl From<MapError> for ApiError {
    fn from(err: MapError) -> Self {
        ApiError::InvalidIdentifier(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidIdentifier(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Ingest(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// `?ns=foreign` marks identifiers in the request as foreign-namespace
/// forms that must pass through the mapper.
#[derive(Debug, Default, Deserialize)]
pub struct NamespaceQuery {
    pub ns: Option<String>,
}

impl NamespaceQuery {
    pub(crate) fn is_foreign(&self) -> bool {
        self.ns.as_deref() == Some("foreign")
    }
}

/// The untyped wire form of an event. Parsed into a typed [`Event`]
/// exactly once, at this boundary; any malformed identifier is a `400`
/// here instead of a deferred failure deeper in the pipeline.
#[derive(Debug, Deserialize)]
pub struct WireEvent {
    pub id: String,
    pub channel_id: String,
    pub sender: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub state_key: Option<String>,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub parents: BTreeSet<String>,
    #[serde(default)]
    pub depth: u64,
}

impl WireEvent {
    pub(crate) fn into_event(self, foreign: bool) -> Result<Event, ApiError> {
        let (id, channel_id, sender) = if foreign {
            (
                from_foreign_event(&ForeignEventRef::new(&self.id))?,
                from_foreign_channel(&ForeignChannelRef::new(&self.channel_id))?,
                from_foreign_user(&ForeignUserRef::new(&self.sender))?,
            )
        } else {
            (
                self.id.parse()?,
                self.channel_id.parse()?,
                self.sender.parse()?,
            )
        };

        let mut parents = BTreeSet::new();
        for parent in &self.parents {
            let parent_id = if foreign {
                from_foreign_event(&ForeignEventRef::new(parent))?
            } else {
                parent.parse()?
            };
            parents.insert(parent_id);
        }

        Ok(Event {
            id,
            channel_id,
            sender,
            event_type: self.event_type,
            state_key: self.state_key,
            content: self.content,
            parents,
            depth: self.depth,
        })
    }
}

/// `POST /api/federation/events` — runs an inbound event through the
/// ingest pipeline.
pub async fn ingest_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(ns): Query<NamespaceQuery>,
    Json(wire): Json<WireEvent>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let event = wire.into_event(ns.is_foreign())?;
    let outcome = ingest_event(&state, event).await?;
    Ok(ingest_response(outcome))
}

fn ingest_response(outcome: IngestOutcome) -> (StatusCode, Json<Value>) {
    match outcome {
        IngestOutcome::Accepted => (StatusCode::OK, Json(json!({ "outcome": "accepted" }))),
        IngestOutcome::AlreadyKnown => {
            (StatusCode::OK, Json(json!({ "outcome": "already_known" })))
        }
        IngestOutcome::PendingBackfill { missing } => (
            StatusCode::CONFLICT,
            Json(json!({
                "outcome": "pending_backfill",
                "missing": missing.iter().map(|id| id.as_str()).collect::<Vec<_>>(),
            })),
        ),
        IngestOutcome::Rejected { reason } => (
            StatusCode::FORBIDDEN,
            Json(json!({ "outcome": "rejected", "reason": reason.as_str() })),
        ),
        IngestOutcome::InviteDenied { status, reason } => (
            StatusCode::FORBIDDEN,
            Json(json!({
                "outcome": "invite_denied",
                "status": status.as_str(),
                "reason": reason,
            })),
        ),
    }
}

/// `GET /api/federation/events/{event_id}` — fetches a stored event.
pub async fn get_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(event_id): Path<String>,
    Query(ns): Query<NamespaceQuery>,
) -> Result<Json<Event>, ApiError> {
    let id: EventId = if ns.is_foreign() {
        from_foreign_event(&ForeignEventRef::new(&event_id))?
    } else {
        event_id.parse()?
    };

    let pool = state.pool.clone();
    let event = tokio::task::spawn_blocking(move || -> Result<Event, ApiError> {
        let conn = pool.get().map_err(IngestError::from)?;
        match get(&conn, &id) {
            Ok(event) => Ok(event),
            Err(StoreError::NotFound(_)) => Err(ApiError::NotFound),
            Err(err) => Err(IngestError::from(err).into()),
        }
    })
    .await
    .map_err(IngestError::from)??;

    Ok(Json(event))
}

/// `GET /api/channels/{channel_id}/state` — the channel's resolved state,
/// one entry per StateKey.
pub async fn channel_state_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(channel_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let channel: ChannelId = channel_id.parse()?;

    let pool = state.pool.clone();
    let snapshot = {
        let channel = channel.clone();
        tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
            let conn = pool.get().map_err(IngestError::from)?;
            read_state_cache(&conn, &channel).map_err(|err| IngestError::from(err).into())
        })
        .await
        .map_err(IngestError::from)??
    };

    let entries: Vec<Value> = snapshot
        .iter()
        .map(|(key, event_id)| {
            json!({
                "event_type": key.event_type,
                "state_key": key.state_key,
                "event_id": event_id.as_str(),
            })
        })
        .collect();

    Ok(Json(json!({
        "channel_id": channel.to_string(),
        "state": entries,
    })))
}
