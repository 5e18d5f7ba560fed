//! Upstream weather and news sources

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::RealtimeQuery;
use crate::{Error, Result};

/// Public wttr.in endpoint
pub const WTTR_URL: &str = "https://wttr.in";

/// Public `NewsAPI` endpoint
pub const NEWSAPI_URL: &str = "https://newsapi.org";
const HEADLINE_COUNT: usize = 3;

/// One network fetch for a realtime query
///
/// Implementations make a single attempt. Retries, caching and timeouts
/// belong to the agent.
#[async_trait]
pub trait RealtimeSource: Send + Sync {
    /// Fetch a speakable answer for `query`
    async fn fetch(&self, query: &RealtimeQuery) -> Result<String>;
}

#[derive(serde::Deserialize)]
struct HeadlinesResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(serde::Deserialize)]
struct Article {
    title: Option<String>,
}

/// Weather from wttr.in and headlines from `NewsAPI`
pub struct HttpRealtimeSource {
    client: reqwest::Client,
    weather_url: String,
    news_url: String,
    news_api_key: Option<SecretString>,
}

impl HttpRealtimeSource {
    /// Create a source against the public endpoints
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(news_api_key: Option<SecretString>, request_timeout: Duration) -> Result<Self> {
        Self::with_endpoints(WTTR_URL, NEWSAPI_URL, news_api_key, request_timeout)
    }

    /// Create a source against custom endpoints
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn with_endpoints(
        weather_url: impl Into<String>,
        news_url: impl Into<String>,
        news_api_key: Option<SecretString>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("dali/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            weather_url: weather_url.into().trim_end_matches('/').to_string(),
            news_url: news_url.into().trim_end_matches('/').to_string(),
            news_api_key,
        })
    }

    async fn weather(&self, location: Option<&str>) -> Result<String> {
        // wttr.in reads `+` in the format string as a literal separator
        let url = match location {
            Some(city) => format!(
                "{}/{}?format=%t+%C",
                self.weather_url,
                urlencoding::encode(city.trim())
            ),
            None => format!("{}/?format=%t+%C", self.weather_url),
        };

        tracing::debug!(url = %url, "fetching weather");

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "weather service error");
            return Err(Error::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Realtime("empty weather report".to_string()));
        }

        Ok(format!("Current weather: {text}"))
    }

    async fn headlines(&self, country: &str) -> Result<String> {
        let Some(key) = self.news_api_key.as_ref() else {
            return Err(Error::Config(
                "news API key not configured, set NEWSAPI_KEY to enable headlines".to_string(),
            ));
        };

        tracing::debug!(country, "fetching headlines");

        let page_size = HEADLINE_COUNT.to_string();
        let response = self
            .client
            .get(format!("{}/v2/top-headlines", self.news_url))
            .query(&[
                ("country", country),
                ("pageSize", page_size.as_str()),
                ("apiKey", key.expose_secret()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "news service error");
            return Err(Error::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: HeadlinesResponse = response.json().await?;
        Ok(render_headlines(&parsed.articles))
    }
}

fn render_headlines(articles: &[Article]) -> String {
    let titles: Vec<&str> = articles
        .iter()
        .take(HEADLINE_COUNT)
        .filter_map(|a| a.title.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    if titles.is_empty() {
        return "No headlines available.".to_string();
    }

    format!("Top headlines: {}.", titles.join(". "))
}

#[async_trait]
impl RealtimeSource for HttpRealtimeSource {
    async fn fetch(&self, query: &RealtimeQuery) -> Result<String> {
        match query {
            RealtimeQuery::Weather { location } => self.weather(location.as_deref()).await,
            RealtimeQuery::News { country } => self.headlines(country).await,
        }
    }
}
