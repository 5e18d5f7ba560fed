//! Session orchestrator
//!
//! Owns the awake-window lifecycle and decides, per turn, whether each
//! capability is served by the cloud or by a local engine. A cloud failure
//! falls back to the local engine for the rest of the same turn and locks the
//! window offline for every later turn.

use std::sync::Arc;
use std::time::Duration;

use super::intent::{Intent, IntentRules, shorten_reply};
use super::turn::{
    CLOUD_TROUBLE_NOTICE, FAREWELL_REPLY, NO_DATA_REPLY, NO_INPUT_REPLY, NOT_UNDERSTOOD_REPLY,
    Turn, TurnResult,
};
use super::window::{AwakeWindow, LockReason};
use crate::config::Config;
use crate::db::{ConversationLog, TurnRecord};
use crate::mode::{CallOutcome, ConfiguredMode, Mode, ReplySource, reply_source};
use crate::providers::{Capabilities, CloudProviders};
use crate::realtime::{Lookup, RealtimeDataAgent, RealtimeQuery};
use crate::{Error, Result};

/// Per-session settings taken from configuration
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Language used when the cloud does not detect one
    pub language: String,
    /// Cloud TTS speaker voice
    pub speaker: String,
    /// Silence after which a window ends
    pub idle_timeout: Duration,
    /// Longest wait for a single utterance
    pub capture_timeout: Duration,
    /// Transcript classification
    pub rules: IntentRules,
    /// Freshness of cached weather
    pub weather_ttl: Duration,
    /// Freshness of cached headlines
    pub news_ttl: Duration,
}

impl SessionSettings {
    /// Build settings from the loaded config
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            language: config.assistant.language.clone(),
            speaker: config.assistant.speaker.clone(),
            idle_timeout: config.session.idle_timeout,
            capture_timeout: config.session.capture_timeout,
            rules: IntentRules {
                exit_phrases: config.session.exit_phrases.clone(),
                default_location: config.realtime.default_location.clone(),
                news_country: config.realtime.news_country.clone(),
            },
            weather_ttl: config.realtime.weather_ttl,
            news_ttl: config.realtime.news_ttl,
        }
    }

    /// Cache lifetime for a query
    #[must_use]
    pub const fn ttl_for(&self, query: &RealtimeQuery) -> Duration {
        match query {
            RealtimeQuery::Weather { .. } => self.weather_ttl,
            RealtimeQuery::News { .. } => self.news_ttl,
        }
    }
}

/// What the capture/transcribe stage produced
enum Heard {
    Text(String),
    Nothing,
    Unintelligible,
}

/// Cloud usage within a single turn
struct TurnState {
    mode: Mode,
    cloud_failed: bool,
}

impl TurnState {
    const fn new(mode: Mode) -> Self {
        Self {
            mode,
            cloud_failed: false,
        }
    }

    /// Cloud providers for the next step, or `None` once the turn is local
    fn cloud<'a>(&self, providers: Option<&'a CloudProviders>) -> Option<&'a CloudProviders> {
        providers.filter(|_| self.mode == Mode::Online && !self.cloud_failed)
    }

    fn fail_cloud(&mut self, stage: &'static str, error: &Error) {
        tracing::warn!(stage, error = %error, "cloud call failed, falling back to local");
        self.cloud_failed = true;
    }
}

/// Runs awake windows and their turns
pub struct SessionOrchestrator {
    capabilities: Capabilities,
    realtime: RealtimeDataAgent,
    settings: SessionSettings,
    history: Option<Arc<dyn ConversationLog>>,
}

impl SessionOrchestrator {
    /// Create an orchestrator over the given providers
    #[must_use]
    pub fn new(
        capabilities: Capabilities,
        realtime: RealtimeDataAgent,
        settings: SessionSettings,
    ) -> Self {
        Self {
            capabilities,
            realtime,
            settings,
            history: None,
        }
    }

    /// Record every turn to a conversation log
    #[must_use]
    pub fn with_history(mut self, history: Arc<dyn ConversationLog>) -> Self {
        self.history = Some(history);
        self
    }

    /// Session settings
    #[must_use]
    pub const fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Shared realtime agent
    #[must_use]
    pub const fn realtime(&self) -> &RealtimeDataAgent {
        &self.realtime
    }

    /// Open a new awake window
    ///
    /// Online and Auto windows probe the cloud once. An unreachable cloud, or
    /// no cloud providers at all, locks the window offline from the start.
    pub async fn start_window(&self, configured: ConfiguredMode) -> AwakeWindow {
        let reachable = if configured.wants_cloud() {
            self.probe_cloud().await
        } else {
            false
        };

        let mut window = AwakeWindow::new(configured, reachable);

        if configured.wants_cloud() && !reachable {
            window.lock_offline(LockReason::ProbeFailed);
            tracing::warn!(
                window_id = %window.id(),
                "cloud unreachable, window locked offline"
            );
        }

        tracing::info!(
            window_id = %window.id(),
            configured = %configured,
            mode = %window.effective_mode(),
            "awake window started"
        );

        window
    }

    /// Effective mode for the next turn of `window`
    #[allow(clippy::unused_self)]
    #[must_use]
    pub const fn resolve_mode(&self, window: &AwakeWindow) -> Mode {
        window.effective_mode()
    }

    /// Latch the window offline if an online turn saw a cloud failure
    #[allow(clippy::unused_self)]
    pub fn record_turn_outcome(&self, window: &mut AwakeWindow, turn: &Turn) {
        if turn.resolved_mode == Mode::Online
            && turn.cloud_failed
            && window.lock_offline(LockReason::CloudFailure)
        {
            tracing::warn!(
                window_id = %window.id(),
                "cloud failed mid-turn, window locked offline"
            );
        }
    }

    /// Whether the window should end
    ///
    /// True after an exit phrase, or when nothing was heard for longer than
    /// `idle_timeout`.
    #[allow(clippy::unused_self)]
    #[must_use]
    pub fn is_window_expired(&self, window: &AwakeWindow, idle_timeout: Duration) -> bool {
        window.is_ended() || window.exit_requested() || window.idle_for() > idle_timeout
    }

    /// Close the window
    #[allow(clippy::unused_self)]
    pub fn end_window(&self, window: &mut AwakeWindow) {
        if window.is_ended() {
            return;
        }

        window.end();
        tracing::info!(
            window_id = %window.id(),
            turns = window.turns(),
            locked = window.is_offline_locked(),
            "awake window ended"
        );
    }

    /// Listen for one utterance and reply to it
    ///
    /// # Errors
    ///
    /// Returns error only if the window has already ended
    pub async fn run_turn(&self, window: &mut AwakeWindow) -> Result<TurnResult> {
        ensure_active(window)?;

        let mut state = TurnState::new(self.resolve_mode(window));

        let audio = match self
            .capabilities
            .audio
            .capture_utterance(self.settings.capture_timeout)
            .await
        {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(error = %e, "audio capture failed");
                None
            }
        };

        let (heard, language) = match audio {
            Some(wav) => self.transcribe(&wav, &mut state).await,
            None => (Heard::Nothing, self.settings.language.clone()),
        };

        Ok(self.respond(window, heard, language, state).await)
    }

    /// Reply to text that is already known
    ///
    /// # Errors
    ///
    /// Returns error only if the window has already ended
    pub async fn run_text_turn(&self, window: &mut AwakeWindow, text: &str) -> Result<TurnResult> {
        ensure_active(window)?;

        let state = TurnState::new(self.resolve_mode(window));
        let heard = if text.trim().is_empty() {
            Heard::Nothing
        } else {
            Heard::Text(text.trim().to_string())
        };

        Ok(self
            .respond(window, heard, self.settings.language.clone(), state)
            .await)
    }

    /// Speak a short prompt with the local engine, outside any turn
    pub async fn announce(&self, text: &str) {
        if let Err(e) = self.capabilities.local_tts.speak(text).await {
            tracing::warn!(error = %e, "failed to speak prompt");
        }
    }

    async fn probe_cloud(&self) -> bool {
        match &self.capabilities.cloud {
            Some(cloud) => cloud.probe.is_reachable().await,
            None => {
                tracing::debug!("no cloud providers configured");
                false
            }
        }
    }

    async fn transcribe(&self, wav: &[u8], state: &mut TurnState) -> (Heard, String) {
        if let Some(cloud) = state.cloud(self.capabilities.cloud.as_ref()) {
            match cloud.stt.transcribe(wav).await {
                Ok(t) => {
                    let language = t
                        .language
                        .filter(|l| !l.is_empty())
                        .unwrap_or_else(|| self.settings.language.clone());
                    return (heard_from(t.text), language);
                }
                Err(e) => state.fail_cloud("stt", &e),
            }
        }

        let heard = match self.capabilities.local_stt.transcribe(wav).await {
            Ok(text) => heard_from(text),
            Err(e) => {
                tracing::warn!(error = %e, "local transcription failed");
                Heard::Unintelligible
            }
        };

        (heard, self.settings.language.clone())
    }

    async fn respond(
        &self,
        window: &mut AwakeWindow,
        heard: Heard,
        language: String,
        mut state: TurnState,
    ) -> TurnResult {
        let (transcript, intent, reply_text, source) = match heard {
            Heard::Nothing => (
                String::new(),
                Intent::NoInput,
                NO_INPUT_REPLY.to_string(),
                ReplySource::LocalRule,
            ),
            Heard::Unintelligible => (
                String::new(),
                Intent::NoInput,
                NOT_UNDERSTOOD_REPLY.to_string(),
                ReplySource::LocalRule,
            ),
            Heard::Text(text) => {
                window.touch();
                let intent = self.settings.rules.classify(&text);
                let (reply, source) = self.reply_to(&text, &intent, &language, &mut state).await;
                if intent == Intent::Exit {
                    window.request_exit();
                }
                (text, intent, reply, source)
            }
        };

        let spoken = self.speak(&reply_text, &language, &mut state).await;

        let turn = Turn {
            transcript,
            language,
            resolved_mode: state.mode,
            reply_text,
            reply_source: source,
            cloud_failed: state.cloud_failed,
            intent,
        };

        self.record_turn_outcome(window, &turn);
        window.count_turn();

        tracing::info!(
            window_id = %window.id(),
            mode = %turn.resolved_mode,
            source = %turn.reply_source,
            cloud_failed = turn.cloud_failed,
            "turn complete"
        );

        self.log_turn(window, &turn).await;

        TurnResult { turn, spoken }
    }

    async fn reply_to(
        &self,
        text: &str,
        intent: &Intent,
        language: &str,
        state: &mut TurnState,
    ) -> (String, ReplySource) {
        match intent {
            Intent::NoInput => (NO_INPUT_REPLY.to_string(), ReplySource::LocalRule),
            Intent::Exit => (FAREWELL_REPLY.to_string(), ReplySource::LocalRule),
            Intent::Realtime(query) => {
                let pending = self
                    .realtime
                    .spawn(query.clone(), self.settings.ttl_for(query));

                match pending.join().await {
                    Lookup::Fresh(value) | Lookup::Stale(value) => (value, ReplySource::Realtime),
                    Lookup::NoData => (NO_DATA_REPLY.to_string(), ReplySource::LocalRule),
                }
            }
            Intent::Conversation => self.converse(text, language, state).await,
        }
    }

    async fn converse(
        &self,
        text: &str,
        language: &str,
        state: &mut TurnState,
    ) -> (String, ReplySource) {
        if let Some(cloud) = state.cloud(self.capabilities.cloud.as_ref()) {
            match cloud.chat.complete(text, language).await {
                Ok(reply) if !reply.trim().is_empty() => {
                    return (
                        shorten_reply(&reply),
                        reply_source(Mode::Online, CallOutcome::Succeeded),
                    );
                }
                Ok(_) => state.fail_cloud("chat", &Error::Chat("empty reply".to_string())),
                Err(e) => state.fail_cloud("chat", &e),
            }
            self.announce(CLOUD_TROUBLE_NOTICE).await;
        }

        match self.capabilities.dialogue.resolve(text).await {
            Ok(reply) if !reply.trim().is_empty() => {
                (reply, reply_source(Mode::Offline, CallOutcome::Succeeded))
            }
            Ok(_) => (
                NOT_UNDERSTOOD_REPLY.to_string(),
                reply_source(Mode::Offline, CallOutcome::Failed),
            ),
            Err(e) => {
                tracing::warn!(error = %e, "local dialogue failed");
                (
                    NOT_UNDERSTOOD_REPLY.to_string(),
                    reply_source(Mode::Offline, CallOutcome::Failed),
                )
            }
        }
    }

    async fn speak(&self, text: &str, language: &str, state: &mut TurnState) -> bool {
        if let Some(cloud) = state.cloud(self.capabilities.cloud.as_ref()) {
            match cloud.tts.speak(text, language, &self.settings.speaker).await {
                Ok(()) => return true,
                // Synthesis worked, only the local speaker failed
                Err(e @ Error::Audio(_)) => {
                    tracing::warn!(error = %e, "cloud speech playback failed, using local voice");
                }
                Err(e) => state.fail_cloud("tts", &e),
            }
        }

        match self.capabilities.local_tts.speak(text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, reply = %text, "local speech synthesis failed");
                false
            }
        }
    }

    async fn log_turn(&self, window: &AwakeWindow, turn: &Turn) {
        let Some(history) = &self.history else {
            return;
        };

        let record = TurnRecord::from_turn(window.id(), turn);
        if let Err(e) = history.record(&record).await {
            tracing::warn!(error = %e, "failed to record turn");
        }
    }
}

fn heard_from(text: String) -> Heard {
    let text = text.trim();
    if text.is_empty() {
        Heard::Nothing
    } else {
        Heard::Text(text.to_string())
    }
}

fn ensure_active(window: &AwakeWindow) -> Result<()> {
    if window.is_ended() {
        return Err(Error::WindowEnded(window.id().to_string()));
    }
    Ok(())
}
