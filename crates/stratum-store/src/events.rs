//! Append and retrieval operations over the event graph tables.

use std::collections::BTreeSet;
use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension, Row};

use stratum_types::{ChannelId, Event, EventId};

use crate::error::StoreError;

/// Result of an [`append`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The event was durably written.
    Appended,
    /// The event id was already stored; nothing was written. Re-appending
    /// is explicitly idempotent — history is never duplicated and
    /// authorization is never re-evaluated for a stored event.
    AlreadyExists,
}

/// Durably appends an event and its parent links in a single transaction.
///
/// # Errors
///
/// Returns [`StoreError::RejectedParents`] if any declared parent is
/// absent (the caller must backfill first; nothing is written), or
/// [`StoreError::Database`] on SQL failure.
pub fn append(conn: &Connection, event: &Event) -> Result<AppendOutcome, StoreError> {
    let tx = conn.unchecked_transaction()?;

    if event_exists(&tx, &event.id)? {
        return Ok(AppendOutcome::AlreadyExists);
    }

    let mut missing = BTreeSet::new();
    for parent in &event.parents {
        if !event_exists(&tx, parent)? {
            missing.insert(parent.clone());
        }
    }
    if !missing.is_empty() {
        return Err(StoreError::RejectedParents {
            event_id: event.id.clone(),
            missing,
        });
    }

    let content_json = serde_json::to_string(&event.content)?;
    tx.execute(
        "INSERT INTO channel_events
            (event_id, channel_id, sender, event_type, state_key, content_json, depth)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.id.as_str(),
            event.channel_id.to_string(),
            event.sender.to_string(),
            event.event_type,
            event.state_key,
            content_json,
            event.depth as i64,
        ],
    )?;

    for parent in &event.parents {
        tx.execute(
            "INSERT INTO event_parents (event_id, parent_id) VALUES (?1, ?2)",
            params![event.id.as_str(), parent.as_str()],
        )?;
    }

    tx.commit()?;

    tracing::debug!(
        event_id = event.id.as_str(),
        channel_id = %event.channel_id,
        depth = event.depth,
        "appended event"
    );

    Ok(AppendOutcome::Appended)
}

/// Retrieves an event by id.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] if the event is not stored.
pub fn get(conn: &Connection, event_id: &EventId) -> Result<Event, StoreError> {
    let event = conn
        .query_row(
            "SELECT event_id, channel_id, sender, event_type, state_key, content_json, depth
             FROM channel_events WHERE event_id = ?1",
            [event_id.as_str()],
            map_row_to_event,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(event_id.clone()))?;

    let parents = parents_of(conn, event_id)?;
    Ok(Event { parents, ..event })
}

/// Whether the event id is present in the store.
pub fn has_event(conn: &Connection, event_id: &EventId) -> Result<bool, StoreError> {
    Ok(event_exists(conn, event_id)?)
}

/// The declared parents of a stored event.
pub fn parents_of(conn: &Connection, event_id: &EventId) -> Result<BTreeSet<EventId>, StoreError> {
    link_query(
        conn,
        "SELECT parent_id FROM event_parents WHERE event_id = ?1",
        event_id,
    )
}

/// The known children of a stored event.
pub fn children_of(conn: &Connection, event_id: &EventId) -> Result<BTreeSet<EventId>, StoreError> {
    link_query(
        conn,
        "SELECT event_id FROM event_parents WHERE parent_id = ?1",
        event_id,
    )
}

/// The channel's forward extremities: stored events that no stored event
/// of the same channel lists as a parent.
pub fn forward_extremities(
    conn: &Connection,
    channel_id: &ChannelId,
) -> Result<BTreeSet<EventId>, StoreError> {
    let channel = channel_id.to_string();
    let mut stmt = conn.prepare(
        "SELECT e.event_id FROM channel_events e
         WHERE e.channel_id = ?1
           AND NOT EXISTS (
               SELECT 1 FROM event_parents p
               JOIN channel_events c ON c.event_id = p.event_id
               WHERE p.parent_id = e.event_id AND c.channel_id = ?1
           )",
    )?;

    let rows = stmt.query_map([&channel], |row| row.get::<_, String>(0))?;
    collect_event_ids(rows)
}

/// Batch-fetches events by id, in the iteration order of the input set.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] for the first absent id.
pub fn load_events(
    conn: &Connection,
    event_ids: &BTreeSet<EventId>,
) -> Result<Vec<Event>, StoreError> {
    let mut events = Vec::with_capacity(event_ids.len());
    for id in event_ids {
        events.push(get(conn, id)?);
    }
    Ok(events)
}

fn event_exists(conn: &Connection, event_id: &EventId) -> Result<bool, rusqlite::Error> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM channel_events WHERE event_id = ?1)",
        [event_id.as_str()],
        |row| row.get(0),
    )
}

fn link_query(
    conn: &Connection,
    sql: &str,
    event_id: &EventId,
) -> Result<BTreeSet<EventId>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([event_id.as_str()], |row| row.get::<_, String>(0))?;
    collect_event_ids(rows)
}

fn collect_event_ids(
    rows: impl Iterator<Item = rusqlite::Result<String>>,
) -> Result<BTreeSet<EventId>, StoreError> {
    let mut ids = BTreeSet::new();
    for row in rows {
        let raw = row?;
        let id = EventId::from_str(&raw).map_err(|e| {
            StoreError::Database(rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            ))
        })?;
        ids.insert(id);
    }
    Ok(ids)
}

/// Maps a `channel_events` row to an [`Event`] with empty parents; the
/// caller fills parents from `event_parents`.
fn map_row_to_event(row: &Row) -> rusqlite::Result<Event> {
    let convert =
        |idx: usize, e: stratum_types::ParseIdError| -> rusqlite::Error {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        };

    let raw_id: String = row.get(0)?;
    let raw_channel: String = row.get(1)?;
    let raw_sender: String = row.get(2)?;
    let content_json: String = row.get(5)?;

    let content = serde_json::from_str(&content_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Event {
        id: raw_id.parse().map_err(|e| convert(0, e))?,
        channel_id: raw_channel.parse().map_err(|e| convert(1, e))?,
        sender: raw_sender.parse().map_err(|e| convert(2, e))?,
        event_type: row.get(3)?,
        state_key: row.get(4)?,
        content,
        parents: BTreeSet::new(),
        depth: row.get::<_, i64>(6)? as u64,
    })
}
