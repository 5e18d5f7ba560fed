//! Audio capture from microphone
//!
//! `cpal` streams are not `Send`, so everything here blocks and is meant to
//! run on a `spawn_blocking` thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use super::speech::SpeechDetector;
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Audio processing chunk size (100ms at 16kHz)
pub const CHUNK_SIZE: usize = 1600;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captures audio from the default input device
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device at 16 kHz mono
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Name of the input device
    #[must_use]
    pub fn device_name(&self) -> String {
        self.device.name().unwrap_or_default()
    }

    /// Start capturing audio
    ///
    /// # Errors
    ///
    /// Returns error if capture fails
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = Arc::clone(&self.buffer);

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Get captured audio buffer and clear it
    #[must_use]
    pub fn take_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }
}

/// Microphone samples cut into whole detector chunks
///
/// Stops the input stream when dropped.
struct ChunkFeed {
    capture: AudioCapture,
    pending: Vec<f32>,
}

impl ChunkFeed {
    fn open() -> Result<Self> {
        let mut capture = AudioCapture::new()?;
        capture.start()?;
        Ok(Self {
            capture,
            pending: Vec::new(),
        })
    }

    /// Sleep one poll interval, then drain every complete chunk received
    fn poll(&mut self) -> Vec<f32> {
        std::thread::sleep(POLL_INTERVAL);
        self.pending.extend(self.capture.take_buffer());

        let whole = self.pending.len() - self.pending.len() % CHUNK_SIZE;
        self.pending.drain(..whole).collect()
    }
}

impl Drop for ChunkFeed {
    fn drop(&mut self) {
        self.capture.stop();
    }
}

/// Record one utterance from the default microphone
///
/// Returns `None` when `timeout` passes without any speech. Speech still in
/// progress at the deadline is returned as-is.
///
/// # Errors
///
/// Returns error if the input device cannot be opened
pub fn record_utterance(timeout: Duration, trailing_silence: Duration) -> Result<Option<Vec<f32>>> {
    let mut feed = ChunkFeed::open()?;
    let mut detector = SpeechDetector::new(trailing_silence);
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        for chunk in feed.poll().chunks(CHUNK_SIZE) {
            if let Some(utterance) = detector.process(chunk) {
                return Ok(Some(utterance));
            }
        }
    }

    let partial = detector.take_speech_buffer();
    if partial.is_empty() {
        tracing::debug!(timeout_secs = timeout.as_secs(), "no speech before capture timeout");
        return Ok(None);
    }

    Ok(Some(partial))
}

/// Send speech segments from the microphone until `stop` is set or the
/// receiver goes away
///
/// # Errors
///
/// Returns error if the input device cannot be opened
pub fn stream_segments(
    trailing_silence: Duration,
    stop: &AtomicBool,
    segments: &mpsc::Sender<Vec<f32>>,
) -> Result<()> {
    let mut feed = ChunkFeed::open()?;
    let mut detector = SpeechDetector::new(trailing_silence);

    while !stop.load(Ordering::Relaxed) {
        for chunk in feed.poll().chunks(CHUNK_SIZE) {
            let Some(segment) = detector.process(chunk) else {
                continue;
            };

            tracing::debug!(samples = segment.len(), "speech segment captured");
            if segments.blocking_send(segment).is_err() {
                return Ok(());
            }
        }
    }

    Ok(())
}

/// Encode mono f32 samples as 16-bit WAV for speech recognition
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let encode_err = |e: hound::Error| Error::Audio(format!("wav encoding failed: {e}"));

    let mut cursor = std::io::Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(encode_err)?;
    for &sample in samples {
        writer.write_sample(to_pcm16(sample)).map_err(encode_err)?;
    }
    writer.finalize().map_err(encode_err)?;

    Ok(cursor.into_inner())
}

/// Scale a float sample in `[-1.0, 1.0]` to signed 16-bit PCM
#[allow(clippy::cast_possible_truncation)]
fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}
