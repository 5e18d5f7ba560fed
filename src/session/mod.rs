//! Awake windows, turns and the orchestrator that runs them

mod intent;
mod orchestrator;
mod turn;
mod window;

pub use intent::{Intent, IntentRules, MAX_SPOKEN_SENTENCES, shorten_reply};
pub use orchestrator::{SessionOrchestrator, SessionSettings};
pub use turn::{
    CLOUD_TROUBLE_NOTICE, FAREWELL_REPLY, NO_DATA_REPLY, NO_INPUT_REPLY, NOT_UNDERSTOOD_REPLY,
    Turn, TurnResult,
};
pub use window::{AwakeWindow, LockReason, WindowState};
