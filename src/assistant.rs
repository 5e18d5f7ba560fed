//! Application loop
//!
//! Waits for the wake trigger, runs one awake window of turns, and goes back
//! to waiting. Stops when the trigger source closes or on Ctrl+C.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::db::{self, ConversationRepo};
use crate::mode::ConfiguredMode;
use crate::providers::{
    Capabilities, CloudProviders, Espeak, KeyboardTrigger, LocalTextToSpeech, Microphone,
    MicrophoneWake, RuleDialogue, SarvamClient, SarvamSpeech, WakeTrigger, WhisperServer,
};
use crate::realtime::RealtimeDataAgent;
use crate::session::{AwakeWindow, SessionOrchestrator, SessionSettings};
use crate::{Error, Result};

/// Prompt spoken when a window opens from the wake phrase
pub const WAKE_ACKNOWLEDGEMENT: &str = "Yes?";

const LOCAL_STT_TIMEOUT: Duration = Duration::from_secs(30);

/// Startup switches set on the command line
#[derive(Debug, Clone, Copy)]
pub struct AssistantOptions {
    /// Listen for the wake phrase instead of waiting for Enter
    pub wake_word: bool,
    /// Record turns to the history database
    pub history: bool,
}

impl Default for AssistantOptions {
    fn default() -> Self {
        Self {
            wake_word: true,
            history: true,
        }
    }
}

/// Stand-in used when no local speech binary is installed
struct NoLocalSpeech;

#[async_trait]
impl LocalTextToSpeech for NoLocalSpeech {
    async fn speak(&self, _text: &str) -> Result<()> {
        Err(Error::Tts("no local speech engine installed".to_string()))
    }
}

/// Build every provider named by `config`
///
/// Cloud providers exist only when a Sarvam key is configured.
///
/// # Errors
///
/// Returns error if a client cannot be built, or if offline mode is selected
/// and the local speech binary is missing
pub fn build_capabilities(config: &Config) -> Result<Capabilities> {
    let cloud = if config.cloud.api_key.is_some() {
        let client = Arc::new(SarvamClient::new(&config.cloud, &config.assistant.name)?);
        let speech = Arc::new(SarvamSpeech::new(Arc::clone(&client)));
        Some(CloudProviders::sarvam(client, speech))
    } else {
        None
    };

    let local_tts: Arc<dyn LocalTextToSpeech> = match Espeak::locate(
        &config.local.espeak_bin,
        config.assistant.voice_rate,
        config.local.espeak_voice.clone(),
    ) {
        Ok(espeak) => Arc::new(espeak),
        Err(e) if config.assistant.mode == ConfiguredMode::Offline => return Err(e),
        Err(e) => {
            tracing::warn!(error = %e, "local speech unavailable, offline replies will be silent");
            Arc::new(NoLocalSpeech)
        }
    };

    Ok(Capabilities {
        cloud,
        local_stt: Arc::new(WhisperServer::new(&config.local.whisper_url, LOCAL_STT_TIMEOUT)?),
        dialogue: Arc::new(RuleDialogue::new(config.assistant.name.clone())),
        local_tts,
        audio: Arc::new(Microphone),
    })
}

/// Build the orchestrator, attaching history when enabled
///
/// # Errors
///
/// Returns error if the realtime agent cannot be built
pub fn build_orchestrator(
    config: &Config,
    capabilities: Capabilities,
    history: bool,
) -> Result<SessionOrchestrator> {
    let realtime = RealtimeDataAgent::from_config(&config.realtime)?;
    let orchestrator =
        SessionOrchestrator::new(capabilities, realtime, SessionSettings::from_config(config));

    if !(history && config.history_enabled) {
        return Ok(orchestrator);
    }

    match db::init(config.history_path()) {
        Ok(pool) => Ok(orchestrator.with_history(Arc::new(ConversationRepo::new(pool)))),
        Err(e) => {
            tracing::warn!(error = %e, "conversation history disabled");
            Ok(orchestrator)
        }
    }
}

/// The assistant's outer loop
pub struct Assistant {
    orchestrator: SessionOrchestrator,
    trigger: Arc<dyn WakeTrigger>,
    mode: ConfiguredMode,
    acknowledgement: Option<String>,
}

impl Assistant {
    /// Wire an orchestrator to a trigger
    #[must_use]
    pub fn new(
        orchestrator: SessionOrchestrator,
        trigger: Arc<dyn WakeTrigger>,
        mode: ConfiguredMode,
    ) -> Self {
        Self {
            orchestrator,
            trigger,
            mode,
            acknowledgement: None,
        }
    }

    /// Speak `text` each time a window opens
    #[must_use]
    pub fn acknowledge_with(mut self, text: impl Into<String>) -> Self {
        self.acknowledgement = Some(text.into());
        self
    }

    /// Build the assistant from configuration
    ///
    /// # Errors
    ///
    /// Returns error if a required provider cannot be initialized
    pub fn from_config(config: &Config, options: AssistantOptions) -> Result<Self> {
        config.validate()?;

        let capabilities = build_capabilities(config)?;
        let local_stt = Arc::clone(&capabilities.local_stt);
        let orchestrator = build_orchestrator(config, capabilities, options.history)?;

        if options.wake_word && !config.assistant.wake_words.is_empty() {
            let trigger = MicrophoneWake::new(&config.assistant.wake_words, local_stt)?;

            return Ok(
                Self::new(orchestrator, Arc::new(trigger), config.assistant.mode)
                    .acknowledge_with(WAKE_ACKNOWLEDGEMENT),
            );
        }

        tracing::info!("wake phrase disabled, press Enter to talk");
        Ok(Self::new(
            orchestrator,
            Arc::new(KeyboardTrigger::new()),
            config.assistant.mode,
        ))
    }

    /// Session orchestrator
    #[must_use]
    pub const fn orchestrator(&self) -> &SessionOrchestrator {
        &self.orchestrator
    }

    /// Run until Ctrl+C or the trigger closes
    ///
    /// # Errors
    ///
    /// Returns error if the wake trigger fails
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `shutdown` completes or the trigger closes
    ///
    /// # Errors
    ///
    /// Returns error if the wake trigger fails
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        tracing::info!(mode = %self.mode, "assistant ready");

        loop {
            let woke = tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                woke = self.trigger.wait() => woke?,
            };

            if !woke {
                tracing::info!("wake trigger closed");
                break;
            }

            let mut window = self.orchestrator.start_window(self.mode).await;

            if let Some(text) = &self.acknowledgement {
                self.orchestrator.announce(text).await;
            }

            let interrupted = tokio::select! {
                () = &mut shutdown => true,
                () = self.converse(&mut window) => false,
            };

            self.orchestrator.end_window(&mut window);

            if interrupted {
                tracing::info!("shutdown requested");
                break;
            }
        }

        Ok(())
    }

    /// Run turns until the window expires
    async fn converse(&self, window: &mut AwakeWindow) {
        let idle_timeout = self.orchestrator.settings().idle_timeout;

        while !self.orchestrator.is_window_expired(window, idle_timeout) {
            match self.orchestrator.run_turn(window).await {
                Ok(result) => {
                    if !result.turn.transcript.is_empty() {
                        println!("You: {}", result.turn.transcript);
                    }
                    println!("Assistant: {}", result.turn.reply_text);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "turn failed");
                    break;
                }
            }
        }
    }
}
