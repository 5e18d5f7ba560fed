//! Error types for the DALI assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Cloud chat completion error
    #[error("chat error: {0}")]
    Chat(String),

    /// Local dialogue engine error
    #[error("dialogue error: {0}")]
    Dialogue(String),

    /// Wake word detection error
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// Realtime data fetch error
    #[error("realtime error: {0}")]
    Realtime(String),

    /// Upstream returned a non-success status
    #[error("upstream error {status}: {body}")]
    Upstream {
        /// HTTP status code
        status: u16,
        /// Response body (possibly truncated)
        body: String,
    },

    /// A turn was requested on a window that already ended
    #[error("awake window {0} has ended")]
    WindowEnded(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    /// Whether retrying the same request may succeed
    ///
    /// Timeouts, connection failures, rate limits and server errors are
    /// transient. Configuration problems and client errors are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.status().is_some_and(|s| is_recoverable_status(s.as_u16()))
            }
            Self::Upstream { status, .. } => is_recoverable_status(*status),
            Self::Io(_) | Self::Realtime(_) => true,
            _ => false,
        }
    }
}

/// Rate limits (429) and server errors (5xx) are worth retrying
#[must_use]
pub const fn is_recoverable_status(status: u16) -> bool {
    status == 429 || (status >= 500 && status < 600)
}
