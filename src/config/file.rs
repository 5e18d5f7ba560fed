//! TOML configuration file loading
//!
//! Supports `~/.config/dali/config.toml` as a persistent config source.
//! All fields are optional. The file is a partial overlay on top of defaults.
//! String values may reference environment variables as `${VAR}`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

static ENV_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env reference regex"));

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct DaliConfigFile {
    /// Assistant identity and behavior
    #[serde(default)]
    pub assistant: AssistantFileConfig,

    /// Awake window timing
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Cloud provider settings
    #[serde(default)]
    pub online: OnlineFileConfig,

    /// Local engine settings
    #[serde(default)]
    pub offline: OfflineFileConfig,

    /// Weather/news agent settings
    #[serde(default)]
    pub realtime: RealtimeFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub keys: KeysFileConfig,

    /// Conversation history settings
    #[serde(default)]
    pub history: HistoryFileConfig,
}

/// Assistant identity and behavior
#[derive(Debug, Default, Deserialize)]
pub struct AssistantFileConfig {
    /// Spoken name (e.g. "DALI")
    pub name: Option<String>,

    /// Mode: "online", "offline" or "auto"
    pub mode: Option<String>,

    /// BCP-47 language code (e.g. "en-IN")
    pub language: Option<String>,

    /// Cloud TTS speaker voice
    pub speaker: Option<String>,

    /// Local TTS words per minute
    pub voice_rate: Option<u32>,

    /// Wake phrases (empty disables the wake word, falling back to Enter)
    pub wake_words: Option<Vec<String>>,
}

/// Awake window timing
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Seconds without recognized speech before the window ends
    pub idle_timeout_secs: Option<u64>,

    /// Seconds to wait for a single utterance
    pub capture_timeout_secs: Option<u64>,

    /// Phrases that end the window
    pub exit_phrases: Option<Vec<String>>,
}

/// Cloud provider settings
#[derive(Debug, Default, Deserialize)]
pub struct OnlineFileConfig {
    pub base_url: Option<String>,
    pub chat_model: Option<String>,
    pub stt_model: Option<String>,
    pub tts_model: Option<String>,
    pub tts_speed: Option<f32>,
    pub timeout_secs: Option<u64>,
    pub probe_timeout_secs: Option<u64>,
    pub stt_language: Option<String>,
}

/// Local engine settings
#[derive(Debug, Default, Deserialize)]
pub struct OfflineFileConfig {
    /// Local whisper.cpp server URL
    pub whisper_url: Option<String>,
    /// Path or name of the espeak-ng binary
    pub espeak_bin: Option<String>,
    /// espeak-ng voice (e.g. "en-in")
    pub espeak_voice: Option<String>,
}

/// Weather/news agent settings
#[derive(Debug, Default, Deserialize)]
pub struct RealtimeFileConfig {
    pub weather_ttl_secs: Option<u64>,
    pub news_ttl_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub call_timeout_secs: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub weather_url: Option<String>,
    pub news_url: Option<String>,
    pub default_location: Option<String>,
    pub news_country: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct KeysFileConfig {
    pub sarvam_api_key: Option<String>,
    pub newsapi_key: Option<String>,
}

/// Conversation history settings
#[derive(Debug, Default, Deserialize)]
pub struct HistoryFileConfig {
    pub enabled: Option<bool>,
}

/// Load the TOML config file from the standard path
///
/// Returns `DaliConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> DaliConfigFile {
    let Some(path) = config_file_path() else {
        return DaliConfigFile::default();
    };

    load_config_file_from(&path)
}

/// Load a TOML config file from an explicit path
pub fn load_config_file_from(path: &Path) -> DaliConfigFile {
    if !path.exists() {
        return DaliConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match parse_config(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                DaliConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            DaliConfigFile::default()
        }
    }
}

/// Parse config text, expanding `${VAR}` references first
///
/// # Errors
///
/// Returns error if the expanded text is not valid TOML for the schema
pub fn parse_config(content: &str) -> crate::Result<DaliConfigFile> {
    let expanded = substitute_env(content, |name| std::env::var(name).ok());
    Ok(toml::from_str(&expanded)?)
}

/// Replace `${VAR}` references using `lookup`
///
/// Unknown variables are left as-is so the caller can detect them.
pub fn substitute_env<F>(content: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ENV_REF
        .replace_all(content, |caps: &regex::Captures<'_>| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Whether a value is an unexpanded `${VAR}` placeholder
#[must_use]
pub fn is_placeholder(value: &str) -> bool {
    value.trim_start().starts_with("${")
}

/// Return the config file path: `~/.config/dali/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("dali").join("config.toml"))
}
