//! Resolved-state cache.
//!
//! The canonical state of a channel is always recomputable from the event
//! graph; this cache stores the most recent resolution so readers do not
//! pay for a full resolve on every lookup. The resolution engine owns the
//! values written here — the cache is replaced wholesale, never patched.

use std::str::FromStr;

use rusqlite::{params, Connection};

use stratum_types::{ChannelId, ChannelState, EventId, StateKey};

use crate::error::StoreError;

/// Replaces the cached state for a channel with a freshly resolved one.
pub fn write_state_cache(
    conn: &Connection,
    channel_id: &ChannelId,
    state: &ChannelState,
) -> Result<(), StoreError> {
    let tx = conn.unchecked_transaction()?;
    let channel = channel_id.to_string();

    tx.execute(
        "DELETE FROM channel_state_cache WHERE channel_id = ?1",
        [&channel],
    )?;

    for (key, event_id) in state.iter() {
        tx.execute(
            "INSERT INTO channel_state_cache (channel_id, event_type, state_key, event_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![channel, key.event_type, key.state_key, event_id.as_str()],
        )?;
    }

    tx.commit()?;
    Ok(())
}

/// Reads the cached state for a channel. An uncached channel yields the
/// empty state.
pub fn read_state_cache(
    conn: &Connection,
    channel_id: &ChannelId,
) -> Result<ChannelState, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT event_type, state_key, event_id FROM channel_state_cache WHERE channel_id = ?1",
    )?;

    let rows = stmt.query_map([channel_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (event_type, state_key, raw_id) = row?;
        let event_id = EventId::from_str(&raw_id).map_err(|e| {
            StoreError::Database(rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                Box::new(e),
            ))
        })?;
        entries.push((StateKey::new(&event_type, &state_key), event_id));
    }

    Ok(ChannelState::from_entries(entries))
}
