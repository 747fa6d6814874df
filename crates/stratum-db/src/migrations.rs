//! Embedded SQL migration runner.
//!
//! Migrations are SQL files compiled into the binary and applied in
//! sequence on startup. The `_stratum_migrations` table records what has
//! already run, so re-running the list is a no-op.

use rusqlite::Connection;
use thiserror::Error;

/// A single embedded migration.
struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. New migrations are appended here.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "000_channel_events",
        sql: include_str!("migrations/000_channel_events.sql"),
    },
    Migration {
        name: "001_channel_state_cache",
        sql: include_str!("migrations/001_channel_state_cache.sql"),
    },
    Migration {
        name: "002_invite_approvals",
        sql: include_str!("migrations/002_invite_approvals.sql"),
    },
    Migration {
        name: "003_federation_peers",
        sql: include_str!("migrations/003_federation_peers.sql"),
    },
];

/// Errors that can occur during migration execution.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A SQL statement within a migration failed.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        /// The name of the migration that failed.
        name: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// Failed to query migration state.
    #[error("failed to check migration state: {0}")]
    StateQuery(rusqlite::Error),
}

impl MigrationError {
    fn failed(name: &str, source: rusqlite::Error) -> Self {
        Self::ExecutionFailed {
            name: name.to_string(),
            source,
        }
    }
}

fn is_applied(conn: &Connection, name: &str) -> Result<bool, MigrationError> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM _stratum_migrations WHERE name = ?1)",
        [name],
        |row| row.get(0),
    )
    .map_err(MigrationError::StateQuery)
}

/// Applies one migration and its tracking row in one transaction, so a
/// failed migration leaves no schema side effects behind.
fn apply(conn: &Connection, migration: &Migration) -> Result<(), MigrationError> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| MigrationError::failed(migration.name, e))?;
    tx.execute_batch(migration.sql)
        .map_err(|e| MigrationError::failed(migration.name, e))?;
    tx.execute(
        "INSERT INTO _stratum_migrations (name) VALUES (?1)",
        [migration.name],
    )
    .map_err(|e| MigrationError::failed(migration.name, e))?;
    tx.commit()
        .map_err(|e| MigrationError::failed(migration.name, e))
}

/// Runs every pending migration against the given connection and returns
/// how many were applied.
///
/// # Errors
///
/// Returns `MigrationError` if any migration fails to execute or if the
/// tracking table cannot be queried.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    run_list(conn, MIGRATIONS)
}

fn run_list(conn: &Connection, migrations: &[Migration]) -> Result<usize, MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _stratum_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| MigrationError::failed("_stratum_migrations_bootstrap", e))?;

    let mut applied = 0;
    for migration in migrations {
        if is_applied(conn, migration.name)? {
            tracing::debug!(migration = migration.name, "already applied, skipping");
            continue;
        }
        tracing::info!(migration = migration.name, "applying migration");
        apply(conn, migration)?;
        applied += 1;
    }

    Ok(applied)
}
