//! Approval log and peer directory persistence.

use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension, Row};

use stratum_types::{ChannelId, EventId};

use crate::error::FederationError;
use crate::submit::SubmitReport;
use crate::types::{InviteApprovalRequest, InviteStatus};

/// One row in the invite approval audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteLogEntry {
    pub event_id: EventId,
    pub channel_id: ChannelId,
    pub target: String,
    pub remote_endpoint: String,
    pub status: InviteStatus,
    pub reason: Option<String>,
    pub attempts: u32,
}

/// Logs a freshly built approval request as `PENDING`.
pub fn record_pending(
    conn: &Connection,
    request: &InviteApprovalRequest,
    endpoint: &str,
) -> Result<i64, FederationError> {
    conn.execute(
        "INSERT INTO invite_approvals (event_id, channel_id, target, remote_endpoint, status)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            request.object.id.as_str(),
            request.object.channel_id.to_string(),
            request.object.state_key.as_deref().unwrap_or_default(),
            endpoint,
            InviteStatus::Pending.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Records the terminal outcome of a submission against its pending log
/// row.
pub fn record_outcome(
    conn: &Connection,
    event_id: &EventId,
    report: &SubmitReport,
) -> Result<(), FederationError> {
    let reason = match &report.outcome {
        crate::submit::SubmitOutcome::Rejected { reason } => Some(reason.as_str()),
        _ => None,
    };
    conn.execute(
        "UPDATE invite_approvals
         SET status = ?2, reason = ?3, attempts = ?4, updated_at = datetime('now')
         WHERE event_id = ?1 AND status = ?5",
        params![
            event_id.as_str(),
            report.outcome.status().as_str(),
            reason,
            report.attempts,
            InviteStatus::Pending.as_str(),
        ],
    )?;
    Ok(())
}

/// Fetches the most recent log entry for an invite event.
pub fn get_approval(
    conn: &Connection,
    event_id: &EventId,
) -> Result<Option<InviteLogEntry>, FederationError> {
    conn.query_row(
        "SELECT event_id, channel_id, target, remote_endpoint, status, reason, attempts
         FROM invite_approvals
         WHERE event_id = ?1
         ORDER BY id DESC
         LIMIT 1",
        [event_id.as_str()],
        map_row_to_entry,
    )
    .optional()
    .map_err(FederationError::from)
}

/// The registered base URL for a peer domain.
///
/// # Errors
///
/// Returns [`FederationError::UnknownPeer`] when the domain has never been
/// registered — a terminal denial, not a retryable condition.
pub fn peer_base_url(conn: &Connection, domain: &str) -> Result<String, FederationError> {
    conn.query_row(
        "SELECT base_url FROM federation_peers WHERE domain = ?1",
        [domain],
        |row| row.get::<_, String>(0),
    )
    .optional()?
    .ok_or_else(|| FederationError::UnknownPeer(domain.to_string()))
}

/// Registers or replaces a peer's federation endpoint.
pub fn upsert_peer(conn: &Connection, domain: &str, base_url: &str) -> Result<(), FederationError> {
    conn.execute(
        "INSERT INTO federation_peers (domain, base_url) VALUES (?1, ?2)
         ON CONFLICT(domain) DO UPDATE SET base_url = excluded.base_url",
        params![domain, base_url],
    )?;
    Ok(())
}

fn map_row_to_entry(row: &Row<'_>) -> Result<InviteLogEntry, rusqlite::Error> {
    let event_id: String = row.get(0)?;
    let channel_id: String = row.get(1)?;
    let status: String = row.get(4)?;
    Ok(InviteLogEntry {
        event_id: EventId::from_str(&event_id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
        channel_id: ChannelId::from_str(&channel_id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?,
        target: row.get(2)?,
        remote_endpoint: row.get(3)?,
        status: InviteStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                format!("unknown invite status tag: {status}").into(),
            )
        })?,
        reason: row.get(5)?,
        attempts: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stratum_db::run_migrations;
    use stratum_types::Event;

    use crate::submit::SubmitOutcome;
    use crate::types::InviteContext;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn sample_request() -> InviteApprovalRequest {
        let invite = Event::new(
            "!ops:example.org".parse().unwrap(),
            "@alice:example.org".parse().unwrap(),
            "channel.member",
            Some("@bob:remote.net"),
            json!({"membership": "invite"}),
            &[],
        );
        InviteApprovalRequest {
            object: invite,
            context: InviteContext { state: vec![] },
        }
    }

    #[test]
    fn pending_then_outcome_updates_the_log() {
        let conn = conn();
        let request = sample_request();

        record_pending(&conn, &request, "https://remote.net").unwrap();
        let entry = get_approval(&conn, &request.object.id).unwrap().unwrap();
        assert_eq!(entry.status, InviteStatus::Pending);
        assert_eq!(entry.target, "@bob:remote.net");
        assert_eq!(entry.attempts, 0);

        let report = SubmitReport {
            outcome: SubmitOutcome::Rejected {
                reason: "UNKNOWN_SENDER".to_string(),
            },
            attempts: 1,
        };
        record_outcome(&conn, &request.object.id, &report).unwrap();

        let entry = get_approval(&conn, &request.object.id).unwrap().unwrap();
        assert_eq!(entry.status, InviteStatus::RejectedRemote);
        assert_eq!(entry.reason.as_deref(), Some("UNKNOWN_SENDER"));
        assert_eq!(entry.attempts, 1);
    }

    #[test]
    fn outcome_only_overwrites_pending_rows() {
        let conn = conn();
        let request = sample_request();
        record_pending(&conn, &request, "https://remote.net").unwrap();

        let timed_out = SubmitReport {
            outcome: SubmitOutcome::TimedOut,
            attempts: 3,
        };
        record_outcome(&conn, &request.object.id, &timed_out).unwrap();

        // A second, late outcome must not clobber the terminal state.
        let approved = SubmitReport {
            outcome: SubmitOutcome::Approved,
            attempts: 4,
        };
        record_outcome(&conn, &request.object.id, &approved).unwrap();

        let entry = get_approval(&conn, &request.object.id).unwrap().unwrap();
        assert_eq!(entry.status, InviteStatus::TimedOut);
        assert_eq!(entry.attempts, 3);
    }

    #[test]
    fn unknown_peer_is_a_terminal_error() {
        let conn = conn();
        let err = peer_base_url(&conn, "nowhere.net").unwrap_err();
        assert!(matches!(err, FederationError::UnknownPeer(domain) if domain == "nowhere.net"));

        upsert_peer(&conn, "remote.net", "https://remote.net:8448").unwrap();
        assert_eq!(
            peer_base_url(&conn, "remote.net").unwrap(),
            "https://remote.net:8448"
        );
        upsert_peer(&conn, "remote.net", "https://remote.net:9000").unwrap();
        assert_eq!(
            peer_base_url(&conn, "remote.net").unwrap(),
            "https://remote.net:9000"
        );
    }
}
