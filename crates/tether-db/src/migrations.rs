//! Embedded SQL migration runner.
//!
//! Migrations are SQL files embedded at compile time. They run sequentially
//! on startup, tracked by the `_tether_migrations` table. Each migration
//! runs exactly once — if it has already been applied, it is skipped.

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
        name: "000_subjects",
        sql: include_str!("migrations/000_subjects.sql"),
    },
    Migration {
        name: "001_observers",
        sql: include_str!("migrations/001_observers.sql"),
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

/// Runs all pending migrations against the given connection.
///
/// Migrations that have already been applied (tracked in
/// `_tether_migrations`) are skipped. New migrations are applied in order
/// and recorded.
///
/// # Errors
///
/// Returns `MigrationError` if any migration fails to execute or if the
/// migration tracking table cannot be queried.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    run_migrations_from_list(conn, MIGRATIONS)
}

fn run_migrations_from_list(
    conn: &Connection,
    migrations: &[Migration],
) -> Result<usize, MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _tether_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(MigrationError::StateQuery)?;

    let mut applied_count = 0;

    for migration in migrations {
        let already_applied: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM _tether_migrations WHERE name = ?1)",
                [migration.name],
                |row| row.get(0),
            )
            .map_err(MigrationError::StateQuery)?;

        if already_applied {
            continue;
        }

        // One transaction per migration: the batch and its tracking row
        // land together, so a crash cannot leave a half-applied migration
        // that blocks the next startup.
        let tx = conn
            .unchecked_transaction()
            .map_err(MigrationError::StateQuery)?;

        tx.execute_batch(migration.sql)
            .map_err(|source| MigrationError::ExecutionFailed {
                name: migration.name.to_string(),
                source,
            })?;

        tx.execute(
            "INSERT INTO _tether_migrations (name) VALUES (?1)",
            [migration.name],
        )
        .map_err(MigrationError::StateQuery)?;

        tx.commit().map_err(MigrationError::StateQuery)?;

        tracing::debug!(name = migration.name, "applied migration");
        applied_count += 1;
    }

    Ok(applied_count)
}
