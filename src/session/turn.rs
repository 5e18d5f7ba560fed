//! One listen/respond cycle

use super::intent::Intent;
use crate::mode::{Mode, ReplySource};

/// Spoken when capture heard nothing
pub const NO_INPUT_REPLY: &str = "I didn't hear anything. Please try again.";

/// Spoken when a local capability fails
pub const NOT_UNDERSTOOD_REPLY: &str = "Sorry, I didn't understand that.";

/// Spoken when the realtime agent has nothing to offer
pub const NO_DATA_REPLY: &str = "Sorry, I can't fetch that right now.";

/// Spoken locally when the cloud chat fails, before the local reply
pub const CLOUD_TROUBLE_NOTICE: &str = "I'm having trouble with the cloud service.";

/// Spoken on an exit phrase
pub const FAREWELL_REPLY: &str = "Goodbye! Have a great day!";

/// A completed turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// Recognized text, empty when nothing was heard
    pub transcript: String,
    /// Detected or configured language
    pub language: String,
    /// Effective mode the turn started in
    pub resolved_mode: Mode,
    /// Reply that was (or should have been) spoken
    pub reply_text: String,
    /// Engine credited with the reply
    pub reply_source: ReplySource,
    /// Whether any cloud provider failed during the turn
    pub cloud_failed: bool,
    /// What the transcript asked for
    pub intent: Intent,
}

impl Turn {
    /// Whether the turn recognized any speech
    #[must_use]
    pub fn heard_speech(&self) -> bool {
        !self.transcript.trim().is_empty()
    }
}

/// Outcome of `run_turn`
#[derive(Debug, Clone)]
pub struct TurnResult {
    /// The turn record
    pub turn: Turn,
    /// Whether a TTS engine spoke the reply
    pub spoken: bool,
}
