//! Capability providers
//!
//! Each provider exposes one narrow call with a success/failure outcome. The
//! session orchestrator only sees these traits, so cloud and local engines
//! can be swapped (or faked in tests) without touching mode logic.

mod dialogue;
mod espeak;
mod sarvam;
mod trigger;
mod whisper_server;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use dialogue::RuleDialogue;
pub use espeak::Espeak;
pub use sarvam::{SarvamClient, SarvamSpeech};
pub use trigger::{KeyboardTrigger, Microphone, MicrophoneWake};
pub use whisper_server::WhisperServer;

use crate::Result;

/// Text recognized by a cloud STT call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcription {
    /// Recognized text
    pub text: String,
    /// Language detected by the provider, if reported
    pub language: Option<String>,
}

/// Cloud speech recognition
#[async_trait]
pub trait CloudSpeechToText: Send + Sync {
    /// Transcribe WAV audio, detecting the spoken language
    async fn transcribe(&self, wav: &[u8]) -> Result<Transcription>;
}

/// Cloud reply generation
#[async_trait]
pub trait CloudChat: Send + Sync {
    /// Produce a reply for the user's text
    async fn complete(&self, text: &str, language: &str) -> Result<String>;
}

/// Cloud speech synthesis, including playback
///
/// Decode and playback failures are reported as [`Error::Audio`](crate::Error::Audio),
/// which callers treat as a local fault rather than a cloud one.
#[async_trait]
pub trait CloudTextToSpeech: Send + Sync {
    /// Speak `text` aloud in `language` with the given `speaker` voice
    async fn speak(&self, text: &str, language: &str, speaker: &str) -> Result<()>;
}

/// Lightweight cloud connectivity check
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Whether the cloud path currently answers
    async fn is_reachable(&self) -> bool;
}

/// Local speech recognition
#[async_trait]
pub trait LocalSpeechToText: Send + Sync {
    /// Transcribe WAV audio
    async fn transcribe(&self, wav: &[u8]) -> Result<String>;
}

/// Local intent/dialogue engine
#[async_trait]
pub trait LocalDialogue: Send + Sync {
    /// Resolve the user's text to a reply
    async fn resolve(&self, text: &str) -> Result<String>;
}

/// Local speech synthesis, including playback
#[async_trait]
pub trait LocalTextToSpeech: Send + Sync {
    /// Speak `text` aloud
    async fn speak(&self, text: &str) -> Result<()>;
}

/// Blocks until the assistant should wake up
#[async_trait]
pub trait WakeTrigger: Send + Sync {
    /// Wait for the wake phrase
    ///
    /// Returns `false` when the trigger source is exhausted (e.g. stdin closed)
    /// and the application loop should stop.
    async fn wait(&self) -> Result<bool>;
}

/// Captures one spoken utterance
#[async_trait]
pub trait AudioInput: Send + Sync {
    /// Record until the speaker pauses or `timeout` elapses
    ///
    /// Returns WAV bytes, or `None` if nothing but silence was heard.
    async fn capture_utterance(&self, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

/// Cloud-side providers, present only when credentials are configured
#[derive(Clone)]
pub struct CloudProviders {
    pub stt: Arc<dyn CloudSpeechToText>,
    pub chat: Arc<dyn CloudChat>,
    pub tts: Arc<dyn CloudTextToSpeech>,
    pub probe: Arc<dyn ReachabilityProbe>,
}

impl CloudProviders {
    /// Build all cloud capabilities from a single Sarvam client
    #[must_use]
    pub fn sarvam(client: Arc<SarvamClient>, speech: Arc<SarvamSpeech>) -> Self {
        Self {
            stt: client.clone(),
            chat: client.clone(),
            tts: speech,
            probe: client,
        }
    }
}

/// Every provider the orchestrator may call during a turn
#[derive(Clone)]
pub struct Capabilities {
    /// Cloud providers (`None` means the cloud is never reachable)
    pub cloud: Option<CloudProviders>,
    pub local_stt: Arc<dyn LocalSpeechToText>,
    pub dialogue: Arc<dyn LocalDialogue>,
    pub local_tts: Arc<dyn LocalTextToSpeech>,
    pub audio: Arc<dyn AudioInput>,
}
