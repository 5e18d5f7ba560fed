//! Awake window state
//!
//! One window spans wake word to idle timeout or exit phrase. The offline
//! latch can only be set from inside the crate, and only ever false → true.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use uuid::Uuid;

use crate::mode::{ConfiguredMode, Mode, resolve_effective_mode};

/// Why a window was locked offline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReason {
    /// The reachability probe at window start failed
    ProbeFailed,
    /// A cloud provider failed during a turn
    CloudFailure,
}

/// Lifecycle state of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// Turns may run; `locked` forces offline providers
    Active {
        /// Offline latch
        locked: bool,
    },
    /// Window is over; no further turns
    Ended,
}

/// One wake-to-sleep session
#[derive(Debug, Clone)]
pub struct AwakeWindow {
    id: String,
    started_at: DateTime<Utc>,
    configured_mode: ConfiguredMode,
    offline_locked: bool,
    lock_reason: Option<LockReason>,
    cloud_reachable: bool,
    last_activity_at: Instant,
    exit_requested: bool,
    ended: bool,
    turns: u32,
}

impl AwakeWindow {
    pub(crate) fn new(configured_mode: ConfiguredMode, cloud_reachable: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            configured_mode,
            offline_locked: false,
            lock_reason: None,
            cloud_reachable,
            last_activity_at: Instant::now(),
            exit_requested: false,
            ended: false,
            turns: 0,
        }
    }

    /// Unique window identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wall-clock start time
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Mode requested by configuration
    #[must_use]
    pub const fn configured_mode(&self) -> ConfiguredMode {
        self.configured_mode
    }

    /// Whether the offline latch is set
    #[must_use]
    pub const fn is_offline_locked(&self) -> bool {
        self.offline_locked
    }

    /// What set the latch, if it is set
    #[must_use]
    pub const fn lock_reason(&self) -> Option<LockReason> {
        self.lock_reason
    }

    /// Whether the probe found the cloud reachable at window start
    #[must_use]
    pub const fn cloud_reachable(&self) -> bool {
        self.cloud_reachable
    }

    /// Last time a turn recognized speech
    #[must_use]
    pub const fn last_activity_at(&self) -> Instant {
        self.last_activity_at
    }

    /// Whether the last turn asked to end the window
    #[must_use]
    pub const fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Number of turns run so far
    #[must_use]
    pub const fn turns(&self) -> u32 {
        self.turns
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> WindowState {
        if self.ended {
            WindowState::Ended
        } else {
            WindowState::Active {
                locked: self.offline_locked,
            }
        }
    }

    /// Whether the window has ended
    #[must_use]
    pub const fn is_ended(&self) -> bool {
        self.ended
    }

    /// Effective mode for the next turn
    #[must_use]
    pub const fn effective_mode(&self) -> Mode {
        resolve_effective_mode(
            self.configured_mode,
            self.offline_locked,
            self.cloud_reachable,
        )
    }

    /// Time since the last recognized speech
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_activity_at)
    }

    /// Set the offline latch
    ///
    /// Returns `true` only on the false → true transition.
    pub(crate) fn lock_offline(&mut self, reason: LockReason) -> bool {
        if self.offline_locked {
            return false;
        }

        self.offline_locked = true;
        self.lock_reason = Some(reason);
        true
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity_at = Instant::now();
    }

    pub(crate) const fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    pub(crate) const fn count_turn(&mut self) {
        self.turns += 1;
    }

    pub(crate) const fn end(&mut self) {
        self.ended = true;
    }
}
