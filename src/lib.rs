//! DALI - voice assistant with cloud and offline modes
//!
//! This library provides the core functionality for the assistant:
//! - Awake-window sessions with per-turn cloud/offline mode selection
//! - A one-way offline lock once the cloud fails inside a window
//! - Cached, retried weather and news lookups
//! - Voice capture, speech segmentation, decoding and playback
//! - Conversation history in `SQLite`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Assistant loop                      │
//! │    Wake trigger  │  Awake window  │  Shutdown        │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               Session orchestrator                   │
//! │   Mode  │  Offline lock  │  Intent  │  Turn pipeline │
//! └──────────┬──────────────────────────────┬───────────┘
//!            │                              │
//! ┌──────────▼──────────────┐  ┌────────────▼───────────┐
//! │       Providers          │  │   Realtime data agent  │
//! │ Sarvam │ Whisper │ espeak│  │  Weather │ News │ Cache │
//! └──────────────────────────┘  └────────────────────────┘
//! ```

pub mod assistant;
pub mod config;
pub mod db;
pub mod error;
pub mod mode;
pub mod providers;
pub mod realtime;
pub mod session;
pub mod voice;

pub use assistant::{Assistant, AssistantOptions};
pub use config::Config;
pub use db::{ConversationLog, ConversationRepo, DbConn, DbPool, TurnRecord};
pub use error::{Error, Result};
pub use mode::{ConfiguredMode, Mode, ReplySource};
pub use providers::{Capabilities, CloudProviders, Transcription};
pub use realtime::{Lookup, RealtimeDataAgent, RealtimeQuery};
pub use session::{AwakeWindow, Intent, SessionOrchestrator, SessionSettings, Turn, TurnResult};
