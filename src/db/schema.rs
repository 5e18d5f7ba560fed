//! Database schema and migrations

use rusqlite::Connection;

use crate::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS conversations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            mode TEXT NOT NULL,
            language TEXT NOT NULL,
            user_text TEXT NOT NULL,
            response_text TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_created
            ON conversations(created_at);

        PRAGMA user_version = 1;
        ",
    )?;

    tracing::info!("migrated to schema v1");
    Ok(())
}

fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Per-window grouping and fallback bookkeeping
        ALTER TABLE conversations ADD COLUMN window_id TEXT NOT NULL DEFAULT '';
        ALTER TABLE conversations ADD COLUMN reply_source TEXT NOT NULL DEFAULT 'cloud';
        ALTER TABLE conversations ADD COLUMN cloud_failed INTEGER NOT NULL DEFAULT 0;

        CREATE INDEX IF NOT EXISTS idx_conversations_window
            ON conversations(window_id);

        PRAGMA user_version = 2;
        ",
    )?;

    tracing::info!("migrated to schema v2 (window tracking)");
    Ok(())
}
