//! Energy-based speech segmentation and wake phrase matching

use std::time::Duration;

use super::SAMPLE_RATE;

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to keep a segment (0.3 s at 16 kHz)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Trailing silence that closes a wake segment
pub const WAKE_TRAILING_SILENCE: Duration = Duration::from_millis(500);

/// Trailing silence that closes a spoken command
pub const UTTERANCE_TRAILING_SILENCE: Duration = Duration::from_millis(1500);

/// State of the speech detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech
    Idle,
    /// Inside a speech segment
    Speaking,
}

/// Splits a sample stream into speech segments
///
/// A segment starts on the first chunk above the energy threshold and ends
/// once `trailing_silence` of quiet follows it. Segments shorter than 0.3 s
/// are dropped as clicks or noise.
pub struct SpeechDetector {
    state: DetectorState,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
    trailing_silence: usize,
    heard_speech: bool,
}

impl SpeechDetector {
    /// Create a detector that closes segments after `trailing_silence`
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(trailing_silence: Duration) -> Self {
        let trailing = (trailing_silence.as_secs_f64() * f64::from(SAMPLE_RATE)) as usize;

        Self {
            state: DetectorState::Idle,
            speech_buffer: Vec::new(),
            silence_counter: 0,
            trailing_silence: trailing,
            heard_speech: false,
        }
    }

    /// Feed samples
    ///
    /// Returns a completed segment once speech has been followed by enough
    /// silence.
    pub fn process(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        let energy = calculate_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            DetectorState::Idle => {
                if is_speech {
                    self.state = DetectorState::Speaking;
                    self.heard_speech = true;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech started");
                }
            }
            DetectorState::Speaking => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.silence_counter > self.trailing_silence {
                    let segment = std::mem::take(&mut self.speech_buffer);
                    self.state = DetectorState::Idle;
                    self.silence_counter = 0;

                    if segment.len() > MIN_SPEECH_SAMPLES + self.trailing_silence {
                        tracing::debug!(samples = segment.len(), "speech segment complete");
                        return Some(segment);
                    }

                    tracing::trace!(samples = segment.len(), "segment too short, dropped");
                }
            }
        }

        None
    }

    /// Whether any chunk so far crossed the energy threshold
    #[must_use]
    pub const fn heard_speech(&self) -> bool {
        self.heard_speech
    }

    /// Take whatever is buffered, complete or not
    pub fn take_speech_buffer(&mut self) -> Vec<f32> {
        self.state = DetectorState::Idle;
        self.silence_counter = 0;
        std::mem::take(&mut self.speech_buffer)
    }

    /// Get the accumulated speech buffer
    #[must_use]
    pub fn speech_buffer(&self) -> &[f32] {
        &self.speech_buffer
    }

    /// Reset detector to idle state
    pub fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.speech_buffer.clear();
        self.silence_counter = 0;
        self.heard_speech = false;
    }

    /// Get current state
    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }
}

/// Configured wake phrases, normalized for matching
#[derive(Debug, Clone)]
pub struct WakePhrases {
    phrases: Vec<String>,
}

impl WakePhrases {
    /// Normalize phrases to lowercase, dropping blanks
    #[must_use]
    pub fn new(phrases: &[String]) -> Self {
        Self {
            phrases: phrases
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// The phrase contained in `transcript`, if any
    #[must_use]
    pub fn find(&self, transcript: &str) -> Option<&str> {
        let normalized = transcript.to_lowercase();
        self.phrases
            .iter()
            .find(|phrase| normalized.contains(phrase.as_str()))
            .map(String::as_str)
    }

    /// Normalized phrases
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Whether no phrase is configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
pub fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
