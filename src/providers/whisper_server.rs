//! Local speech recognition against a `whisper.cpp` server

use std::time::Duration;

use async_trait::async_trait;

use super::LocalSpeechToText;
use crate::{Error, Result};

#[derive(serde::Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    text: String,
}

/// Client for a `whisper-server` running on this machine
pub struct WhisperServer {
    client: reqwest::Client,
    url: String,
}

impl WhisperServer {
    /// Point at a server such as `http://127.0.0.1:8080`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LocalSpeechToText for WhisperServer {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), url = %self.url, "starting local transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("response_format", "json")
            .text("temperature", "0.0");

        let response = self
            .client
            .post(format!("{}/inference", self.url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "whisper server request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "whisper server error");
            return Err(Error::Stt(format!("whisper server error {status}: {body}")));
        }

        let result: InferenceResponse = response.json().await?;
        let text = result.text.trim().to_string();

        tracing::info!(transcript = %text, "local transcription complete");
        Ok(text)
    }
}
