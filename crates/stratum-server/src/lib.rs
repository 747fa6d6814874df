//! Stratum server library logic.

pub mod api_events;
pub mod api_invite;
pub mod config;
pub mod ingest;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use stratum_auth::RuleCatalog;
use stratum_db::DbPool;
use stratum_federation::RetryPolicy;

use ingest::ChannelLocks;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// This server's origin domain.
    pub server_name: String,
    /// The rule catalogue authorization and resolution run with.
    pub catalog: Arc<dyn RuleCatalog>,
    /// Per-channel write locks.
    pub locks: ChannelLocks,
    /// HTTP client for outbound federation calls.
    pub http: reqwest::Client,
    /// Retry discipline for invite submissions.
    pub retry: RetryPolicy,
}

/// Health check handler.
///
/// Returns `200 OK` with server status and version. Used by load balancers,
/// monitoring, and CI to verify the server is running.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/federation/events", post(api_events::ingest_event_handler))
        .route(
            "/api/federation/events/{event_id}",
            get(api_events::get_event_handler),
        )
        .route("/api/federation/invite", post(api_invite::approval_handler))
        .route(
            "/api/channels/{channel_id}/state",
            get(api_events::channel_state_handler),
        )
        .layer(Extension(Arc::new(state)))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
