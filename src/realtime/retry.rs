//! Backoff schedule for realtime fetches

use std::time::Duration;

use rand::Rng;

/// How many times a realtime fetch is attempted and how long to wait between
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Policy with the given attempt count and default delays
    ///
    /// Zero attempts is treated as one.
    #[must_use]
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }
}

/// Delay before the attempt following `attempt` (zero-based)
///
/// Exponential backoff: `min(base_delay * 2^attempt + jitter, max_delay)`,
/// with jitter of 0-25% of the computed delay.
#[must_use]
pub fn delay_for_attempt(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(policy.max_delay);

    let jitter = base.mul_f64(rand::thread_rng().gen_range(0.0..0.25));

    (base + jitter).min(policy.max_delay)
}
