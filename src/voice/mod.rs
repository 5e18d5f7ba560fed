//! Voice processing module
//!
//! Handles microphone capture, speech segmentation, decoding and playback.

mod capture;
mod decode;
mod playback;
mod speech;

pub use capture::{
    AudioCapture, CHUNK_SIZE, SAMPLE_RATE, record_utterance, samples_to_wav, stream_segments,
};
pub use decode::{DecodedAudio, decode_audio, decode_mp3, decode_wav, resample};
pub use playback::{AudioPlayback, PLAYBACK_SAMPLE_RATE, play_encoded_async};
pub use speech::{
    DetectorState, SpeechDetector, UTTERANCE_TRAILING_SILENCE, WAKE_TRAILING_SILENCE,
    WakePhrases, calculate_energy,
};
