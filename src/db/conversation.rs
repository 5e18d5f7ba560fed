//! Conversation repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{DbConn, DbPool};
use crate::session::Turn;
use crate::{Error, Result};

/// One logged turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRecord {
    pub created_at: DateTime<Utc>,
    pub window_id: String,
    /// Effective mode of the turn ("online" / "offline")
    pub mode: String,
    pub language: String,
    pub user_text: String,
    pub reply_text: String,
    /// Engine credited with the reply
    pub reply_source: String,
    pub cloud_failed: bool,
}

impl TurnRecord {
    /// Snapshot a finished turn
    #[must_use]
    pub fn from_turn(window_id: &str, turn: &Turn) -> Self {
        Self {
            created_at: Utc::now(),
            window_id: window_id.to_string(),
            mode: turn.resolved_mode.as_str().to_string(),
            language: turn.language.clone(),
            user_text: turn.transcript.clone(),
            reply_text: turn.reply_text.clone(),
            reply_source: turn.reply_source.as_str().to_string(),
            cloud_failed: turn.cloud_failed,
        }
    }
}

/// Sink for completed turns
#[async_trait]
pub trait ConversationLog: Send + Sync {
    /// Persist one turn
    async fn record(&self, record: &TurnRecord) -> Result<()>;
}

/// `SQLite`-backed conversation history
#[derive(Clone)]
pub struct ConversationRepo {
    pool: DbPool,
}

impl ConversationRepo {
    /// Create a new conversation repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| Error::Database(e.to_string()))
    }

    /// Insert a turn
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn insert(&self, record: &TurnRecord) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO conversations
                (created_at, window_id, mode, language, user_text, response_text,
                 reply_source, cloud_failed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                record.created_at.to_rfc3339(),
                record.window_id,
                record.mode,
                record.language,
                record.user_text,
                record.reply_text,
                record.reply_source,
                record.cloud_failed,
            ],
        )?;

        Ok(())
    }

    /// Most recent turns, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn recent(&self, limit: usize) -> Result<Vec<TurnRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT created_at, window_id, mode, language, user_text, response_text,
                    reply_source, cloud_failed
             FROM conversations
             ORDER BY id DESC LIMIT ?1",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut records = stmt
            .query_map([limit], |row| {
                Ok(TurnRecord {
                    created_at: parse_datetime(&row.get::<_, String>(0)?),
                    window_id: row.get(1)?,
                    mode: row.get(2)?,
                    language: row.get(3)?,
                    user_text: row.get(4)?,
                    reply_text: row.get(5)?,
                    reply_source: row.get(6)?,
                    cloud_failed: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        records.reverse();
        Ok(records)
    }

    /// Number of turns recorded during one window
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn count_for_window(&self, window_id: &str) -> Result<usize> {
        let conn = self.conn()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM conversations WHERE window_id = ?1",
            [window_id],
            |row| row.get(0),
        )?;

        Ok(usize::try_from(count).unwrap_or(0))
    }
}

#[async_trait]
impl ConversationLog for ConversationRepo {
    async fn record(&self, record: &TurnRecord) -> Result<()> {
        let repo = self.clone();
        let record = record.clone();

        tokio::task::spawn_blocking(move || repo.insert(&record))
            .await
            .map_err(|e| Error::Database(format!("history task failed: {e}")))?
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
