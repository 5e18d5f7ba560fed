//! Configuration management for the DALI assistant
//!
//! Values are layered: built-in defaults, then the TOML file overlay, then
//! environment variables (after loading `.env`), then CLI flags applied by
//! the binary.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use self::file::{DaliConfigFile, is_placeholder};
use crate::mode::ConfiguredMode;
use crate::realtime::{NEWSAPI_URL, WTTR_URL};
use crate::{Error, Result};

/// Default Sarvam API base URL
pub const DEFAULT_SARVAM_URL: &str = "https://api.sarvam.ai";

/// Default local whisper.cpp server URL
pub const DEFAULT_WHISPER_URL: &str = "http://127.0.0.1:8080";

/// Assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Identity and behavior
    pub assistant: AssistantConfig,

    /// Awake window timing
    pub session: SessionConfig,

    /// Cloud provider settings
    pub cloud: CloudConfig,

    /// Local engine settings
    pub local: LocalConfig,

    /// Weather/news agent settings
    pub realtime: RealtimeConfig,

    /// Path to data directory (history database)
    pub data_dir: PathBuf,

    /// Persist turns to the history database
    pub history_enabled: bool,
}

/// Assistant identity and behavior
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Spoken name
    pub name: String,

    /// Requested mode for every awake window
    pub mode: ConfiguredMode,

    /// Language code passed to cloud providers (e.g. "en-IN")
    pub language: String,

    /// Cloud TTS speaker voice
    pub speaker: String,

    /// Local TTS words per minute
    pub voice_rate: u32,

    /// Wake phrases; empty means manual activation
    pub wake_words: Vec<String>,
}

/// Awake window timing
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Time without recognized speech before the window ends
    pub idle_timeout: Duration,

    /// Time to wait for a single utterance
    pub capture_timeout: Duration,

    /// Phrases that end the window
    pub exit_phrases: Vec<String>,
}

/// Cloud provider settings
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// Sarvam API key (cloud disabled when absent)
    pub api_key: Option<SecretString>,

    /// API base URL
    pub base_url: String,

    /// Chat completion model
    pub chat_model: String,

    /// Speech-to-text model
    pub stt_model: String,

    /// Text-to-speech model
    pub tts_model: String,

    /// TTS speed multiplier
    pub tts_speed: f32,

    /// Timeout for chat/STT/TTS requests
    pub timeout: Duration,

    /// Timeout for the reachability probe
    pub probe_timeout: Duration,

    /// Language hint sent with cloud transcription (auto-detect when `None`)
    pub stt_language: Option<String>,
}

/// Local engine settings
#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// whisper.cpp server URL
    pub whisper_url: String,

    /// espeak-ng binary name or path
    pub espeak_bin: String,

    /// espeak-ng voice
    pub espeak_voice: Option<String>,
}

/// Weather/news agent settings
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Freshness of cached weather
    pub weather_ttl: Duration,

    /// Freshness of cached headlines
    pub news_ttl: Duration,

    /// Fetch attempts before giving up
    pub max_attempts: u32,

    /// Upper bound on one lookup including retries
    pub call_timeout: Duration,

    /// Timeout for a single HTTP attempt, kept below `call_timeout` so
    /// retries fit inside the lookup
    pub request_timeout: Duration,

    /// Weather service base URL
    pub weather_url: String,

    /// News service base URL
    pub news_url: String,

    /// Location used when the user doesn't name one
    pub default_location: Option<String>,

    /// Country code for headlines
    pub news_country: String,

    /// newsapi.org key
    pub news_api_key: Option<SecretString>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: "DALI".to_string(),
            mode: ConfiguredMode::Auto,
            language: "en-IN".to_string(),
            speaker: "Anushka".to_string(),
            voice_rate: 160,
            wake_words: vec!["hello dali".to_string()],
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            capture_timeout: Duration::from_secs(15),
            exit_phrases: ["goodbye", "exit", "quit", "stop", "bye"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_SARVAM_URL.to_string(),
            chat_model: "sarvam-m".to_string(),
            stt_model: "saarika:v2.5".to_string(),
            tts_model: "bulbul:v2".to_string(),
            tts_speed: 1.0,
            timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            stt_language: None,
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            whisper_url: DEFAULT_WHISPER_URL.to_string(),
            espeak_bin: "espeak-ng".to_string(),
            espeak_voice: None,
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            weather_ttl: Duration::from_secs(120),
            news_ttl: Duration::from_secs(120),
            max_attempts: 3,
            call_timeout: Duration::from_secs(8),
            request_timeout: Duration::from_millis(2500),
            weather_url: WTTR_URL.to_string(),
            news_url: NEWSAPI_URL.to_string(),
            default_location: None,
            news_country: "in".to_string(),
            news_api_key: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            assistant: AssistantConfig::default(),
            session: SessionConfig::default(),
            cloud: CloudConfig::default(),
            local: LocalConfig::default(),
            realtime: RealtimeConfig::default(),
            data_dir: PathBuf::from("."),
            history_enabled: true,
        }
    }
}

impl Config {
    /// Load configuration from `.env`, the config file and the environment
    ///
    /// # Errors
    ///
    /// Returns error if an environment override has an invalid value
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "failed to load .env"),
        }

        let file = file::load_config_file();
        let mut config = Self::from_file(file)?;
        config.apply_env(|name| std::env::var(name).ok())?;

        // Determine data directory (~/.local/share/dali on Linux)
        config.data_dir = std::env::var("DALI_DATA_DIR").map_or_else(
            |_| {
                directories::ProjectDirs::from("dev", "dali", "dali")
                    .map_or_else(|| PathBuf::from("."), |d| d.data_dir().to_path_buf())
            },
            PathBuf::from,
        );

        if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
            tracing::warn!(
                path = %config.data_dir.display(),
                error = %e,
                "failed to create data directory"
            );
        }

        Ok(config)
    }

    /// Build configuration from defaults overlaid with a parsed config file
    ///
    /// # Errors
    ///
    /// Returns error if the file names an unknown mode
    pub fn from_file(file: DaliConfigFile) -> Result<Self> {
        let mut config = Self::default();

        let a = file.assistant;
        if let Some(name) = a.name {
            config.assistant.name = name;
        }
        if let Some(mode) = a.mode {
            config.assistant.mode = mode.parse()?;
        }
        if let Some(language) = a.language {
            config.assistant.language = language;
        }
        if let Some(speaker) = a.speaker {
            config.assistant.speaker = speaker;
        }
        if let Some(rate) = a.voice_rate {
            config.assistant.voice_rate = rate;
        }
        if let Some(words) = a.wake_words {
            config.assistant.wake_words = normalize_phrases(words);
        }

        let s = file.session;
        if let Some(secs) = s.idle_timeout_secs {
            config.session.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = s.capture_timeout_secs {
            config.session.capture_timeout = Duration::from_secs(secs);
        }
        if let Some(phrases) = s.exit_phrases {
            config.session.exit_phrases = normalize_phrases(phrases);
        }

        let o = file.online;
        if let Some(url) = o.base_url {
            config.cloud.base_url = url;
        }
        if let Some(model) = o.chat_model {
            config.cloud.chat_model = model;
        }
        if let Some(model) = o.stt_model {
            config.cloud.stt_model = model;
        }
        if let Some(model) = o.tts_model {
            config.cloud.tts_model = model;
        }
        if let Some(speed) = o.tts_speed {
            config.cloud.tts_speed = speed;
        }
        if let Some(secs) = o.timeout_secs {
            config.cloud.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = o.probe_timeout_secs {
            config.cloud.probe_timeout = Duration::from_secs(secs);
        }
        config.cloud.stt_language = o.stt_language.filter(|l| !l.trim().is_empty());

        let l = file.offline;
        if let Some(url) = l.whisper_url {
            config.local.whisper_url = url;
        }
        if let Some(bin) = l.espeak_bin {
            config.local.espeak_bin = bin;
        }
        config.local.espeak_voice = l.espeak_voice;

        let r = file.realtime;
        if let Some(secs) = r.weather_ttl_secs {
            config.realtime.weather_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = r.news_ttl_secs {
            config.realtime.news_ttl = Duration::from_secs(secs);
        }
        if let Some(n) = r.max_attempts {
            config.realtime.max_attempts = n.max(1);
        }
        if let Some(secs) = r.call_timeout_secs {
            config.realtime.call_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = r.request_timeout_ms {
            config.realtime.request_timeout = Duration::from_millis(ms);
        }
        if let Some(url) = r.weather_url {
            config.realtime.weather_url = url;
        }
        if let Some(url) = r.news_url {
            config.realtime.news_url = url;
        }
        config.realtime.default_location = r.default_location;
        if let Some(country) = r.news_country {
            config.realtime.news_country = country;
        }

        config.cloud.api_key = secret(file.keys.sarvam_api_key);
        config.realtime.news_api_key = secret(file.keys.newsapi_key);

        if let Some(enabled) = file.history.enabled {
            config.history_enabled = enabled;
        }

        Ok(config)
    }

    /// Apply environment overrides using `lookup`
    ///
    /// # Errors
    ///
    /// Returns error if `DALI_MODE` or a numeric override is invalid
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = secret(lookup("SARVAM_API_KEY")) {
            self.cloud.api_key = Some(key);
        }
        if let Some(key) = secret(lookup("NEWSAPI_KEY")) {
            self.realtime.news_api_key = Some(key);
        }
        if let Some(mode) = lookup("DALI_MODE") {
            self.assistant.mode = mode.parse()?;
        }
        if let Some(language) = lookup("DALI_LANGUAGE") {
            self.assistant.language = language;
        }
        if let Some(language) = lookup("DALI_STT_LANGUAGE") {
            self.cloud.stt_language = Some(language).filter(|l| !l.trim().is_empty());
        }
        if let Some(url) = lookup("SARVAM_BASE_URL") {
            self.cloud.base_url = url;
        }
        if let Some(url) = lookup("DALI_WHISPER_URL") {
            self.local.whisper_url = url;
        }
        if let Some(location) = lookup("DALI_WEATHER_LOCATION") {
            self.realtime.default_location = Some(location);
        }
        if let Some(secs) = lookup("DALI_IDLE_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                Error::Config(format!("DALI_IDLE_TIMEOUT_SECS must be a number, got '{secs}'"))
            })?;
            self.session.idle_timeout = Duration::from_secs(secs);
        }

        Ok(())
    }

    /// Check that the selected mode can run at all
    ///
    /// # Errors
    ///
    /// Returns error when `Online` mode has no cloud API key
    pub fn validate(&self) -> Result<()> {
        if self.assistant.mode == ConfiguredMode::Online && self.cloud.api_key.is_none() {
            return Err(Error::Config(
                "online mode requires SARVAM_API_KEY (or keys.sarvam_api_key)".to_string(),
            ));
        }

        if self.assistant.mode == ConfiguredMode::Auto && self.cloud.api_key.is_none() {
            tracing::warn!("SARVAM_API_KEY not set - every window will run offline");
        }

        Ok(())
    }

    /// Path of the conversation history database
    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("conversation.db")
    }
}

/// Wrap a configured key, ignoring blanks and unexpanded `${VAR}` placeholders
fn secret(value: Option<String>) -> Option<SecretString> {
    value
        .filter(|v| !v.trim().is_empty() && !is_placeholder(v))
        .map(|v| SecretString::new(v.trim().to_string().into()))
}

/// Lowercase and trim phrases, dropping empties
fn normalize_phrases(phrases: Vec<String>) -> Vec<String> {
    phrases
        .into_iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}
