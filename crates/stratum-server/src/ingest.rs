//! The event ingest pipeline.
//!
//! Every mutation of a channel passes through [`ingest_event`]: causal
//! gating, authorization against the resolved state at the event's
//! parents, the remote approval detour for cross-server invites, the
//! append itself, and the refresh of the cached canonical state.
//!
//! Channels are independent resources: ingest is serialized per channel
//! by [`ChannelLocks`] and fully parallel across channels. Authorization
//! must see a consistent read of prior state, so the lock is held from
//! the first store read to the final append.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

use stratum_auth::well_known::{CHANNEL_MEMBER, MEMBERSHIP_INVITE};
use stratum_auth::{authorize, AuthDecision, RejectReason, RuleCatalog};
use stratum_db::DbPool;
use stratum_federation::{
    build_approval_request, peer_base_url, record_outcome, record_pending, submit,
    FederationError, InviteStatus, SubmitOutcome,
};
use stratum_resolve::{resolve, state_at_parents, ResolveError};
use stratum_store::{
    append, forward_extremities, get, has_event, write_state_cache, AppendOutcome, StoreError,
};
use stratum_types::{ChannelId, Event, EventId, UserId};

use crate::AppState;

/// Errors that abort ingest. Everything recoverable — missing parents,
/// authorization rejections, remote denials — is an [`IngestOutcome`], not
/// an error.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The connection pool is exhausted or broken.
    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// State resolution failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The invite workflow failed before any network call.
    #[error(transparent)]
    Federation(#[from] FederationError),

    /// A blocking task panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result of ingesting one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Appended; channel state refreshed if it was a state event.
    Accepted,
    /// The event id is already stored; nothing changed.
    AlreadyKnown,
    /// Declared parents are absent. Nothing was written — the caller must
    /// backfill the missing events and resubmit.
    PendingBackfill { missing: BTreeSet<EventId> },
    /// The rule catalogue refused the event.
    Rejected { reason: RejectReason },
    /// A cross-server invite was denied, timed out, or had no reachable
    /// peer. No local event was appended.
    InviteDenied {
        status: InviteStatus,
        reason: Option<String>,
    },
}

/// Per-channel write locks: one logical writer per channel, no shared
/// state across channels.
#[derive(Clone, Default)]
pub struct ChannelLocks {
    // The outer lock guards only brief map lookups and never spans an
    // await point; the inner per-channel mutex is async and does.
    inner: Arc<Mutex<HashMap<ChannelId, Arc<tokio::sync::Mutex<()>>>>>,
}

impl ChannelLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the write lock for a channel, waiting behind any ingest
    /// already in flight for it.
    pub async fn acquire(&self, channel_id: &ChannelId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(channel_id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

enum Staged {
    Known,
    MissingParents(BTreeSet<EventId>),
    Rejected(RejectReason),
    Ready { remote_target: Option<UserId> },
}

enum Prepared {
    Submit(stratum_federation::InviteApprovalRequest, String),
    UnknownPeer(String),
}

/// Runs one event through the full ingest pipeline.
pub async fn ingest_event(state: &AppState, event: Event) -> Result<IngestOutcome, IngestError> {
    let _guard = state.locks.acquire(&event.channel_id).await;

    let staged = {
        let pool = state.pool.clone();
        let catalog = Arc::clone(&state.catalog);
        let event = event.clone();
        let server_name = state.server_name.clone();
        tokio::task::spawn_blocking(move || {
            stage_event(&pool, &event, catalog.as_ref(), &server_name)
        })
        .await??
    };

    let remote_target = match staged {
        Staged::Known => return Ok(IngestOutcome::AlreadyKnown),
        Staged::MissingParents(missing) => {
            return Ok(IngestOutcome::PendingBackfill { missing })
        }
        Staged::Rejected(reason) => return Ok(IngestOutcome::Rejected { reason }),
        Staged::Ready { remote_target } => remote_target,
    };

    if let Some(target) = remote_target {
        if let Some(denied) = approve_remote_invite(state, &event, &target).await? {
            return Ok(denied);
        }
    }

    let pool = state.pool.clone();
    let catalog = Arc::clone(&state.catalog);
    tokio::task::spawn_blocking(move || commit_event(&pool, &event, catalog.as_ref())).await?
}

/// Pre-append checks under a consistent read: dedup, causal gating,
/// authorization, and remote-invite detection.
fn stage_event(
    pool: &DbPool,
    event: &Event,
    catalog: &dyn RuleCatalog,
    server_name: &str,
) -> Result<Staged, IngestError> {
    let conn = pool.get()?;

    if has_event(&conn, &event.id)? {
        return Ok(Staged::Known);
    }

    let mut missing = BTreeSet::new();
    for parent in &event.parents {
        if !has_event(&conn, parent)? {
            missing.insert(parent.clone());
        }
    }
    if !missing.is_empty() {
        tracing::debug!(
            event_id = event.id.as_str(),
            missing = missing.len(),
            "deferring event until parents are backfilled"
        );
        return Ok(Staged::MissingParents(missing));
    }

    // Depth is hashed into the event id, so a forged depth is perfectly
    // self-consistent. It must be checked against the stored parents or a
    // sender could steal the depth tie-break in state resolution.
    if !event.parents.is_empty() {
        let mut max_parent_depth = 0;
        for parent in &event.parents {
            max_parent_depth = max_parent_depth.max(get(&conn, parent)?.depth);
        }
        if event.depth != max_parent_depth + 1 {
            tracing::debug!(
                event_id = event.id.as_str(),
                declared = event.depth,
                expected = max_parent_depth + 1,
                "rejecting event with inconsistent depth"
            );
            return Ok(Staged::Rejected(RejectReason::MalformedEvent));
        }
    }

    let context = state_at_parents(&conn, event, catalog)?;
    if let AuthDecision::Rejected(reason) = authorize(event, &context, catalog) {
        return Ok(Staged::Rejected(reason));
    }

    Ok(Staged::Ready {
        remote_target: remote_invite_target(event, server_name),
    })
}

/// The invite target when `event` invites a user hosted elsewhere.
fn remote_invite_target(event: &Event, server_name: &str) -> Option<UserId> {
    if event.event_type != CHANNEL_MEMBER {
        return None;
    }
    if event.content.get("membership").and_then(|v| v.as_str()) != Some(MEMBERSHIP_INVITE) {
        return None;
    }
    let target: UserId = event.state_key.as_deref()?.parse().ok()?;
    (target.domain() != server_name).then_some(target)
}

/// Runs the remote approval handshake. Returns `None` on approval, or the
/// denial outcome the caller must surface. Nothing is appended here.
async fn approve_remote_invite(
    state: &AppState,
    event: &Event,
    target: &UserId,
) -> Result<Option<IngestOutcome>, IngestError> {
    let prepared = {
        let pool = state.pool.clone();
        let catalog = Arc::clone(&state.catalog);
        let event = event.clone();
        let domain = target.domain().to_string();
        tokio::task::spawn_blocking(move || -> Result<Prepared, IngestError> {
            let conn = pool.get()?;
            let endpoint = match peer_base_url(&conn, &domain) {
                Ok(url) => url,
                Err(FederationError::UnknownPeer(domain)) => {
                    return Ok(Prepared::UnknownPeer(domain))
                }
                Err(err) => return Err(err.into()),
            };
            let request = build_approval_request(&conn, &event, catalog.as_ref())?;
            record_pending(&conn, &request, &endpoint)?;
            Ok(Prepared::Submit(request, endpoint))
        })
        .await??
    };

    let (request, endpoint) = match prepared {
        Prepared::Submit(request, endpoint) => (request, endpoint),
        Prepared::UnknownPeer(domain) => {
            tracing::warn!(
                event_id = event.id.as_str(),
                domain = %domain,
                "invite target's domain has no registered peer"
            );
            return Ok(Some(IngestOutcome::InviteDenied {
                status: InviteStatus::RejectedRemote,
                reason: Some(format!("no federation peer registered for {domain}")),
            }));
        }
    };

    let report = submit(&state.http, &request, &endpoint, &state.retry).await;

    {
        let pool = state.pool.clone();
        let event_id = event.id.clone();
        let report = report.clone();
        tokio::task::spawn_blocking(move || -> Result<(), IngestError> {
            let conn = pool.get()?;
            record_outcome(&conn, &event_id, &report)?;
            Ok(())
        })
        .await??;
    }

    match report.outcome {
        SubmitOutcome::Approved => Ok(None),
        SubmitOutcome::Rejected { reason } => Ok(Some(IngestOutcome::InviteDenied {
            status: InviteStatus::RejectedRemote,
            reason: Some(reason),
        })),
        SubmitOutcome::TimedOut => Ok(Some(IngestOutcome::InviteDenied {
            status: InviteStatus::TimedOut,
            reason: None,
        })),
    }
}

/// Appends the event and refreshes the cached canonical state.
fn commit_event(
    pool: &DbPool,
    event: &Event,
    catalog: &dyn RuleCatalog,
) -> Result<IngestOutcome, IngestError> {
    let conn = pool.get()?;

    match append(&conn, event) {
        Ok(AppendOutcome::Appended) => {}
        Ok(AppendOutcome::AlreadyExists) => return Ok(IngestOutcome::AlreadyKnown),
        Err(StoreError::RejectedParents { missing, .. }) => {
            return Ok(IngestOutcome::PendingBackfill { missing })
        }
        Err(err) => return Err(err.into()),
    }

    if event.is_state() {
        let tips = forward_extremities(&conn, &event.channel_id)?;
        let resolved = resolve(&conn, &tips, catalog)?;
        write_state_cache(&conn, &event.channel_id, &resolved)?;
    }

    tracing::info!(
        event_id = event.id.as_str(),
        channel_id = %event.channel_id,
        event_type = %event.event_type,
        "event accepted"
    );
    Ok(IngestOutcome::Accepted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn channel() -> ChannelId {
        "!ops:example.org".parse().unwrap()
    }

    fn invite(target: &str) -> Event {
        Event::new(
            channel(),
            "@alice:example.org".parse().unwrap(),
            CHANNEL_MEMBER,
            Some(target),
            json!({"membership": "invite"}),
            &[],
        )
    }

    #[test]
    fn remote_invite_target_detects_foreign_domains() {
        let event = invite("@bob:remote.net");
        assert_eq!(
            remote_invite_target(&event, "example.org"),
            Some("@bob:remote.net".parse().unwrap())
        );

        // Local targets need no handshake.
        let event = invite("@bob:example.org");
        assert_eq!(remote_invite_target(&event, "example.org"), None);

        // Non-invite membership events never trigger one.
        let mut event = invite("@bob:remote.net");
        event.content = json!({"membership": "join"});
        assert_eq!(remote_invite_target(&event, "example.org"), None);
    }

    #[tokio::test]
    async fn locks_serialize_within_a_channel_only() {
        let locks = ChannelLocks::new();
        let other: ChannelId = "!other:example.org".parse().unwrap();

        let held = locks.acquire(&channel()).await;

        // Same channel: a second acquire must wait.
        let same = channel();
        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&same));
        assert!(blocked.await.is_err());

        // Different channel: immediate.
        let _parallel = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&other))
            .await
            .expect("independent channel must not block");

        drop(held);
        tokio::time::timeout(Duration::from_millis(50), locks.acquire(&channel()))
            .await
            .expect("lock must be free after release");
    }
}
