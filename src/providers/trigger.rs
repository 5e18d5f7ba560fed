//! Wake triggers and utterance capture from real devices

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{Mutex, mpsc};

use super::{AudioInput, LocalSpeechToText, WakeTrigger};
use crate::voice::{
    SAMPLE_RATE, UTTERANCE_TRAILING_SILENCE, WAKE_TRAILING_SILENCE, WakePhrases,
    record_utterance, samples_to_wav, stream_segments,
};
use crate::{Error, Result};

/// Wakes when Enter is pressed on stdin
pub struct KeyboardTrigger {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl KeyboardTrigger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

impl Default for KeyboardTrigger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WakeTrigger for KeyboardTrigger {
    async fn wait(&self) -> Result<bool> {
        println!("Press Enter to talk...");

        let mut lines = self.lines.lock().await;
        match lines.next_line().await? {
            Some(_) => Ok(true),
            None => {
                tracing::info!("stdin closed");
                Ok(false)
            }
        }
    }
}

/// Sets the flag when dropped so a cancelled wait stops its capture thread
struct StopOnDrop(Arc<AtomicBool>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Listens on the microphone for one of the wake phrases
///
/// Speech segments are transcribed with the local recognizer, so waking works
/// without any cloud connection.
pub struct MicrophoneWake {
    phrases: WakePhrases,
    stt: Arc<dyn LocalSpeechToText>,
}

impl MicrophoneWake {
    /// Listen for `phrases`
    ///
    /// # Errors
    ///
    /// Returns error if no phrase is configured
    pub fn new(phrases: &[String], stt: Arc<dyn LocalSpeechToText>) -> Result<Self> {
        let phrases = WakePhrases::new(phrases);
        if phrases.is_empty() {
            return Err(Error::WakeWord("no wake phrase configured".to_string()));
        }

        Ok(Self { phrases, stt })
    }

    /// Check segments produced by `listen` on a blocking thread
    ///
    /// The listener is stopped and joined before returning, so the input
    /// device is free once a wake is reported.
    async fn listen_with<L>(&self, listen: L) -> Result<bool>
    where
        L: FnOnce(&AtomicBool, &mpsc::Sender<Vec<f32>>) -> Result<()> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let _guard = StopOnDrop(Arc::clone(&stop));
        let (tx, mut rx) = mpsc::channel(4);

        let thread_stop = Arc::clone(&stop);
        let listener = tokio::task::spawn_blocking(move || listen(&thread_stop, &tx));

        let mut woke = false;
        while let Some(segment) = rx.recv().await {
            if self.matches(&segment).await? {
                woke = true;
                break;
            }
        }

        stop.store(true, Ordering::Relaxed);
        drop(rx);
        let joined = listener
            .await
            .map_err(|e| Error::Audio(format!("wake listener failed: {e}")))?;

        match joined {
            Err(e) if woke => {
                tracing::warn!(error = %e, "wake listener stopped with error");
                Ok(true)
            }
            Err(e) => Err(e),
            Ok(()) => Ok(woke),
        }
    }

    async fn matches(&self, segment: &[f32]) -> Result<bool> {
        let wav = samples_to_wav(segment, SAMPLE_RATE)?;

        let transcript = match self.stt.transcribe(&wav).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "wake segment transcription failed");
                return Ok(false);
            }
        };

        tracing::debug!(transcript = %transcript, "checking for wake phrase");

        let Some(phrase) = self.phrases.find(&transcript) else {
            return Ok(false);
        };

        tracing::info!(phrase, "wake phrase detected");
        Ok(true)
    }
}

#[async_trait]
impl WakeTrigger for MicrophoneWake {
    async fn wait(&self) -> Result<bool> {
        tracing::info!(phrases = ?self.phrases.phrases(), "listening for wake phrase");

        self.listen_with(|stop, tx| stream_segments(WAKE_TRAILING_SILENCE, stop, tx))
            .await
    }
}

/// Records utterances from the default microphone
#[derive(Debug, Default, Clone, Copy)]
pub struct Microphone;

#[async_trait]
impl AudioInput for Microphone {
    async fn capture_utterance(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let samples = tokio::task::spawn_blocking(move || {
            record_utterance(timeout, UTTERANCE_TRAILING_SILENCE)
        })
        .await
        .map_err(|e| Error::Audio(format!("capture task failed: {e}")))??;

        samples
            .map(|samples| samples_to_wav(&samples, SAMPLE_RATE))
            .transpose()
    }
}
