//! Realtime data agent
//!
//! Serves weather and news answers from a TTL cache, refetching with bounded
//! retries when an entry is missing or expired. A failed refresh falls back
//! to the last known value when one exists. Every lookup is bounded by a
//! per-call timeout so a turn never waits on an unresponsive network.

mod retry;
mod sources;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub use retry::{RetryPolicy, delay_for_attempt};
pub use sources::{HttpRealtimeSource, NEWSAPI_URL, RealtimeSource, WTTR_URL};

use crate::Result;
use crate::config::RealtimeConfig;

/// A weather or news request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeQuery {
    /// Current conditions, at the IP-derived location when `None`
    Weather {
        /// City name
        location: Option<String>,
    },
    /// Top headlines for a country
    News {
        /// Two-letter country code
        country: String,
    },
}

impl RealtimeQuery {
    /// Cache key: `weather:<city>` or `news:<country>`
    #[must_use]
    pub fn cache_key(&self) -> String {
        match self {
            Self::Weather { location } => format!(
                "weather:{}",
                location
                    .as_deref()
                    .map_or_else(|| "default".to_string(), |l| l.trim().to_lowercase())
            ),
            Self::News { country } => format!("news:{}", country.trim().to_lowercase()),
        }
    }
}

impl fmt::Display for RealtimeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// Result of a lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Valid cached value or a successful refetch
    Fresh(String),
    /// Refresh failed; last known value
    Stale(String),
    /// Refresh failed and nothing was ever cached
    NoData,
}

impl Lookup {
    /// The value, if any
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Fresh(v) | Self::Stale(v) => Some(v),
            Self::NoData => None,
        }
    }

    /// Consume into the value, if any
    #[must_use]
    pub fn into_value(self) -> Option<String> {
        match self {
            Self::Fresh(v) | Self::Stale(v) => Some(v),
            Self::NoData => None,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    fetched_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_valid(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < self.ttl
    }
}

/// Cached, retrying front for a [`RealtimeSource`]
///
/// Cloning shares the cache.
#[derive(Clone)]
pub struct RealtimeDataAgent {
    source: Arc<dyn RealtimeSource>,
    cache: Arc<RwLock<HashMap<String, CacheEntry>>>,
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl RealtimeDataAgent {
    /// Create an agent over `source`
    #[must_use]
    pub fn new(source: Arc<dyn RealtimeSource>, policy: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            source,
            cache: Arc::new(RwLock::new(HashMap::new())),
            policy,
            call_timeout,
        }
    }

    /// Create an agent backed by the configured HTTP sources
    ///
    /// Each HTTP attempt is bounded by `request_timeout` (never longer than
    /// `call_timeout`) so a hung upstream leaves room for retries.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn from_config(config: &RealtimeConfig) -> Result<Self> {
        let source = HttpRealtimeSource::with_endpoints(
            config.weather_url.clone(),
            config.news_url.clone(),
            config.news_api_key.clone(),
            config.request_timeout.min(config.call_timeout),
        )?;

        Ok(Self::new(
            Arc::new(source),
            RetryPolicy::with_attempts(config.max_attempts),
            config.call_timeout,
        ))
    }

    /// Answer `query`, refetching when the cached entry is missing or expired
    ///
    /// A successful fetch is cached for `ttl`. Never fails: exhausted retries
    /// or a timeout yield the stale value or [`Lookup::NoData`].
    pub async fn get(&self, query: &RealtimeQuery, ttl: Duration) -> Lookup {
        let key = query.cache_key();

        if let Some(value) = self.cached(&key).await {
            tracing::debug!(key = %key, "realtime cache hit");
            return Lookup::Fresh(value);
        }

        match tokio::time::timeout(self.call_timeout, self.fetch_with_retry(query, &key)).await {
            Ok(Ok(value)) => {
                self.cache.write().await.insert(
                    key.clone(),
                    CacheEntry {
                        value: value.clone(),
                        fetched_at: Instant::now(),
                        ttl,
                    },
                );
                tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "realtime cache refreshed");
                Lookup::Fresh(value)
            }
            Ok(Err(e)) => {
                tracing::warn!(key = %key, error = %e, "realtime fetch failed");
                self.fallback(&key).await
            }
            Err(_) => {
                tracing::warn!(
                    key = %key,
                    timeout_ms = u64::try_from(self.call_timeout.as_millis()).unwrap_or(u64::MAX),
                    "realtime fetch timed out"
                );
                self.fallback(&key).await
            }
        }
    }

    /// Start a lookup in the background
    ///
    /// The returned handle is awaited where the value is needed.
    #[must_use]
    pub fn spawn(&self, query: RealtimeQuery, ttl: Duration) -> PendingLookup {
        let agent = self.clone();
        PendingLookup {
            handle: tokio::spawn(async move { agent.get(&query, ttl).await }),
        }
    }

    async fn cached(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.cache
            .read()
            .await
            .get(key)
            .filter(|entry| entry.is_valid(now))
            .map(|entry| entry.value.clone())
    }

    async fn fallback(&self, key: &str) -> Lookup {
        match self.cache.read().await.get(key) {
            Some(entry) => {
                tracing::info!(key = %key, "serving stale realtime value");
                Lookup::Stale(entry.value.clone())
            }
            None => Lookup::NoData,
        }
    }

    async fn fetch_with_retry(&self, query: &RealtimeQuery, key: &str) -> Result<String> {
        let mut attempt = 0;

        loop {
            match self.source.fetch(query).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < self.policy.max_attempts => {
                    let delay = delay_for_attempt(&self.policy, attempt);
                    tracing::debug!(
                        key = %key,
                        attempt = attempt + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "realtime fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// A lookup running in the background
pub struct PendingLookup {
    handle: JoinHandle<Lookup>,
}

impl PendingLookup {
    /// Wait for the lookup
    ///
    /// A panicked or cancelled task resolves to [`Lookup::NoData`].
    pub async fn join(self) -> Lookup {
        match self.handle.await {
            Ok(lookup) => lookup,
            Err(e) => {
                tracing::warn!(error = %e, "realtime lookup task failed");
                Lookup::NoData
            }
        }
    }
}
