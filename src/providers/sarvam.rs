//! Sarvam AI cloud provider
//!
//! Chat completions, speech recognition (saarika) and speech synthesis
//! (bulbul) behind one API key.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use super::{CloudChat, CloudSpeechToText, CloudTextToSpeech, ReachabilityProbe, Transcription};
use crate::config::CloudConfig;
use crate::voice::play_encoded_async;
use crate::{Error, Result};

const API_KEY_HEADER: &str = "api-subscription-key";

#[derive(serde::Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(serde::Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(serde::Deserialize)]
struct SttResponse {
    transcript: Option<String>,
    text: Option<String>,
    language_code: Option<String>,
}

/// System prompt that keeps replies short enough to speak
#[must_use]
pub fn system_prompt(name: &str) -> String {
    format!(
        "You are {name}, a helpful voice assistant. You are NOT Salvador Dali the artist.\n\
         Keep responses concise and conversational (2-3 sentences max) since you're speaking out loud.\n\
         For time/date queries, provide the actual current time or date.\n\
         Be friendly, helpful, and direct."
    )
}

/// HTTP client for the Sarvam API
pub struct SarvamClient {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    chat_model: String,
    stt_model: String,
    tts_model: String,
    tts_speed: f32,
    stt_language: Option<String>,
    system_prompt: String,
    probe_timeout: Duration,
}

impl SarvamClient {
    /// Create a client from cloud settings
    ///
    /// # Errors
    ///
    /// Returns error if no API key is configured or the HTTP client cannot be built
    pub fn new(config: &CloudConfig, assistant_name: &str) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("Sarvam API key required (SARVAM_API_KEY)".to_string()))?;

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        tracing::debug!(
            base_url = %config.base_url,
            model = %config.chat_model,
            "sarvam client initialized"
        );

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chat_model: config.chat_model.clone(),
            stt_model: config.stt_model.clone(),
            tts_model: config.tts_model.clone(),
            tts_speed: config.tts_speed,
            stt_language: config.stt_language.clone(),
            system_prompt: system_prompt(assistant_name),
            probe_timeout: config.probe_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send one chat completion
    async fn chat(&self, body: &Value, timeout: Option<Duration>) -> Result<ChatResponse> {
        let mut request = self
            .client
            .post(self.url("/v1/chat/completions"))
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(body);

        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Sarvam chat error");
            return Err(match status.as_u16() {
                401 => Error::Chat("invalid Sarvam API key".to_string()),
                429 => Error::Upstream {
                    status: 429,
                    body: "Sarvam rate limit exceeded".to_string(),
                },
                code => Error::Upstream { status: code, body },
            });
        }

        Ok(response.json().await?)
    }

    /// Synthesize speech, returning the decoded audio bytes (WAV)
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or no audio is returned
    pub async fn synthesize(&self, text: &str, language: &str, speaker: &str) -> Result<Vec<u8>> {
        tracing::debug!(chars = text.len(), language, speaker, "starting Sarvam synthesis");

        let response = self
            .client
            .post(self.url("/v1/text-to-speech/convert"))
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&json!({
                "model": self.tts_model,
                "language_code": language,
                "speaker": speaker,
                "speed": self.tts_speed,
                "format": "wav",
                "input": [text],
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Sarvam TTS error");
            return Err(Error::Tts(format!("Sarvam TTS error {status}: {body}")));
        }

        let body: Value = response.json().await?;
        let encoded = extract_audio(&body)
            .ok_or_else(|| Error::Tts("no audio returned".to_string()))?;

        BASE64
            .decode(encoded)
            .map_err(|e| Error::Tts(format!("invalid audio encoding: {e}")))
    }
}

/// First base64 clip from `audio` or `audios`, as a string or list
fn extract_audio(body: &Value) -> Option<&str> {
    ["audio", "audios"].iter().find_map(|field| match body.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.as_str()),
        Value::Array(items) => items.first()?.as_str(),
        _ => None,
    })
}

#[async_trait]
impl CloudChat for SarvamClient {
    async fn complete(&self, text: &str, language: &str) -> Result<String> {
        tracing::debug!(language, "sending Sarvam chat completion");

        let body = json!({
            "model": self.chat_model,
            "messages": [
                { "role": "system", "content": self.system_prompt },
                { "role": "user", "content": text },
            ],
            "temperature": 0.7,
            "max_tokens": 512,
        });

        let response = self.chat(&body, None).await?;
        let reply = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Chat("no choices in response".to_string()))?
            .message
            .content
            .unwrap_or_default();

        Ok(reply.trim().to_string())
    }
}

#[async_trait]
impl CloudSpeechToText for SarvamClient {
    async fn transcribe(&self, wav: &[u8]) -> Result<Transcription> {
        tracing::debug!(audio_bytes = wav.len(), "starting Sarvam transcription");

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.stt_model.clone());
        if let Some(language) = &self.stt_language {
            form = form.text("language_code", language.clone());
        }

        let response = self
            .client
            .post(self.url("/v1/speech-to-text"))
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Sarvam STT error");
            return Err(Error::Stt(format!("Sarvam STT error {status}: {body}")));
        }

        let result: SttResponse = response.json().await?;
        let text = result.transcript.or(result.text).unwrap_or_default();

        tracing::info!(transcript = %text, language = ?result.language_code, "transcription complete");

        Ok(Transcription {
            text: text.trim().to_string(),
            language: result.language_code.or_else(|| self.stt_language.clone()),
        })
    }
}

#[async_trait]
impl ReachabilityProbe for SarvamClient {
    async fn is_reachable(&self) -> bool {
        let body = json!({
            "model": self.chat_model,
            "messages": [{ "role": "user", "content": "hi" }],
            "max_tokens": 1,
            "temperature": 0.2,
        });

        match self.chat(&body, Some(self.probe_timeout)).await {
            Ok(response) => !response.choices.is_empty(),
            Err(e) => {
                tracing::warn!(error = %e, "Sarvam probe failed");
                false
            }
        }
    }
}

/// Cloud TTS that plays Sarvam audio on the default speaker
pub struct SarvamSpeech {
    client: Arc<SarvamClient>,
}

impl SarvamSpeech {
    /// Speak through `client`
    #[must_use]
    pub const fn new(client: Arc<SarvamClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CloudTextToSpeech for SarvamSpeech {
    async fn speak(&self, text: &str, language: &str, speaker: &str) -> Result<()> {
        let audio = self.client.synthesize(text, language, speaker).await?;
        play_encoded_async(audio).await
    }
}
