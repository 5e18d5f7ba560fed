//! Mode resolution
//!
//! Pure decision tables mapping window state to the effective mode of a turn,
//! and a capability outcome to the source credited with the reply. Nothing in
//! here performs I/O.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Mode requested by configuration for an awake window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfiguredMode {
    /// Always use cloud providers (until the window locks offline)
    Online,
    /// Always use local providers
    Offline,
    /// Use the cloud if the per-window probe reaches it
    #[default]
    Auto,
}

impl ConfiguredMode {
    /// Whether windows in this mode should probe cloud reachability
    #[must_use]
    pub const fn wants_cloud(self) -> bool {
        matches!(self, Self::Online | Self::Auto)
    }

    /// String form used in config files and logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for ConfiguredMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfiguredMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "online" | "cloud" => Ok(Self::Online),
            "offline" | "local" => Ok(Self::Offline),
            "auto" => Ok(Self::Auto),
            other => Err(Error::Config(format!(
                "unknown mode '{other}' (expected online, offline or auto)"
            ))),
        }
    }
}

/// Effective mode of a single turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Cloud providers
    Online,
    /// Local providers
    Offline,
}

impl Mode {
    /// String form used in logs and history
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which engine produced the reply of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    /// Cloud chat completion
    Cloud,
    /// Fixed rule reply (apology, re-prompt, farewell)
    LocalRule,
    /// Local dialogue engine
    LocalDialogue,
    /// Realtime data agent (weather/news)
    Realtime,
}

impl ReplySource {
    /// String form used in logs and history
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cloud => "cloud",
            Self::LocalRule => "local_rule",
            Self::LocalDialogue => "local_dialogue",
            Self::Realtime => "realtime",
        }
    }
}

impl fmt::Display for ReplySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the capability call that was supposed to produce the reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The provider returned reply text
    Succeeded,
    /// The provider signalled failure
    Failed,
}

/// Effective mode for a turn
///
/// A locked window is always offline. Otherwise the configured mode wins,
/// with `Auto` deferring to cloud reachability.
#[must_use]
pub const fn resolve_effective_mode(
    configured: ConfiguredMode,
    offline_locked: bool,
    cloud_reachable: bool,
) -> Mode {
    if offline_locked {
        return Mode::Offline;
    }

    match configured {
        ConfiguredMode::Online => Mode::Online,
        ConfiguredMode::Offline => Mode::Offline,
        ConfiguredMode::Auto if cloud_reachable => Mode::Online,
        ConfiguredMode::Auto => Mode::Offline,
    }
}

/// Source credited with a reply given the mode it was produced in
#[must_use]
pub const fn reply_source(mode: Mode, outcome: CallOutcome) -> ReplySource {
    match (mode, outcome) {
        (Mode::Online, CallOutcome::Succeeded) => ReplySource::Cloud,
        (Mode::Offline, CallOutcome::Succeeded) => ReplySource::LocalDialogue,
        (_, CallOutcome::Failed) => ReplySource::LocalRule,
    }
}
