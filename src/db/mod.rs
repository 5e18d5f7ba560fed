//! Conversation history persistence

mod conversation;
mod schema;

use std::path::Path;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

pub use conversation::{ConversationLog, ConversationRepo, TurnRecord};
pub use schema::SCHEMA_VERSION;

use crate::{Error, Result};

/// Pool of `SQLite` connections to the history database
pub type DbPool = Pool<SqliteConnectionManager>;

/// Connection checked out of a [`DbPool`]
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Open the history database at `path`, creating it and its parent
/// directory when missing
///
/// # Errors
///
/// Returns error if the file cannot be created or the schema cannot be applied
pub fn init<P: AsRef<Path>>(path: P) -> Result<DbPool> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let pool = open(SqliteConnectionManager::file(path), 2)?;
    tracing::info!(path = %path.display(), version = SCHEMA_VERSION, "history database ready");
    Ok(pool)
}

/// Open a throwaway in-memory database
///
/// A single connection keeps every caller on the same database.
///
/// # Errors
///
/// Returns error if the schema cannot be applied
pub fn init_memory() -> Result<DbPool> {
    open(SqliteConnectionManager::memory(), 1)
}

fn open(manager: SqliteConnectionManager, max_size: u32) -> Result<DbPool> {
    let pool = Pool::builder()
        .max_size(max_size)
        .build(manager)
        .map_err(|e| Error::Database(e.to_string()))?;

    let conn = pool.get().map_err(|e| Error::Database(e.to_string()))?;
    schema::init(&conn)?;

    Ok(pool)
}
