//! Shared test utilities
//!
//! Fake providers with call counters. Audio "captures" carry the transcript
//! as UTF-8 bytes, and both fake recognizers decode it back, so a test can
//! script what the user says turn by turn.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use dali_assistant::db::{ConversationLog, TurnRecord};
use dali_assistant::providers::{
    AudioInput, Capabilities, CloudChat, CloudProviders, CloudSpeechToText, CloudTextToSpeech,
    LocalDialogue, LocalSpeechToText, LocalTextToSpeech, ReachabilityProbe, Transcription,
    WakeTrigger,
};
use dali_assistant::realtime::{RealtimeDataAgent, RealtimeQuery, RealtimeSource, RetryPolicy};
use dali_assistant::session::{IntentRules, SessionOrchestrator, SessionSettings};
use dali_assistant::{DbPool, Error, Result, db};

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

fn transcript(wav: &[u8]) -> String {
    String::from_utf8_lossy(wav).into_owned()
}

/// Cloud fake covering all four cloud capabilities
#[derive(Default)]
pub struct FakeCloud {
    unreachable: AtomicBool,
    stt_fails: AtomicBool,
    chat_fails: AtomicBool,
    tts_fails: AtomicBool,
    speaker_broken: AtomicBool,
    pub probes: AtomicUsize,
    pub stt_calls: AtomicUsize,
    pub chat_calls: AtomicUsize,
    pub tts_calls: AtomicUsize,
}

impl FakeCloud {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn unreachable() -> Arc<Self> {
        let cloud = Self::default();
        cloud.unreachable.store(true, Ordering::SeqCst);
        Arc::new(cloud)
    }

    /// Make every cloud call after the probe fail
    pub fn fail(&self) {
        self.fail_stt();
        self.fail_chat();
        self.fail_tts();
    }

    pub fn fail_stt(&self) {
        self.stt_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_chat(&self) {
        self.chat_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_tts(&self) {
        self.tts_fails.store(true, Ordering::SeqCst);
    }

    /// Synthesis succeeds but the speaker cannot play the audio
    pub fn break_speaker(&self) {
        self.speaker_broken.store(true, Ordering::SeqCst);
    }

    /// Make cloud calls succeed again
    pub fn recover(&self) {
        for flag in [
            &self.unreachable,
            &self.stt_fails,
            &self.chat_fails,
            &self.tts_fails,
            &self.speaker_broken,
        ] {
            flag.store(false, Ordering::SeqCst);
        }
    }

    pub fn calls(&self) -> usize {
        self.stt_calls.load(Ordering::SeqCst)
            + self.chat_calls.load(Ordering::SeqCst)
            + self.tts_calls.load(Ordering::SeqCst)
    }

    pub fn providers(self: &Arc<Self>) -> CloudProviders {
        CloudProviders {
            stt: self.clone(),
            chat: self.clone(),
            tts: self.clone(),
            probe: self.clone(),
        }
    }

    fn check(flag: &AtomicBool) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(Error::Upstream {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CloudSpeechToText for FakeCloud {
    async fn transcribe(&self, wav: &[u8]) -> Result<Transcription> {
        self.stt_calls.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.stt_fails)?;
        Ok(Transcription {
            text: transcript(wav),
            language: Some("hi-IN".to_string()),
        })
    }
}

#[async_trait]
impl CloudChat for FakeCloud {
    async fn complete(&self, text: &str, _language: &str) -> Result<String> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.chat_fails)?;
        Ok(format!("Cloud says: {text}"))
    }
}

#[async_trait]
impl CloudTextToSpeech for FakeCloud {
    async fn speak(&self, _text: &str, _language: &str, _speaker: &str) -> Result<()> {
        self.tts_calls.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.tts_fails)?;
        if self.speaker_broken.load(Ordering::SeqCst) {
            return Err(Error::Audio("no output device available".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ReachabilityProbe for FakeCloud {
    async fn is_reachable(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        !self.unreachable.load(Ordering::SeqCst)
    }
}

/// Local recognizer, dialogue and voice
#[derive(Default)]
pub struct FakeLocal {
    dialogue_fails: AtomicBool,
    tts_fails: AtomicBool,
    pub stt_calls: AtomicUsize,
    pub dialogue_calls: AtomicUsize,
    pub tts_calls: AtomicUsize,
    pub spoken: Mutex<Vec<String>>,
}

impl FakeLocal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_dialogue(&self) {
        self.dialogue_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_tts(&self) {
        self.tts_fails.store(true, Ordering::SeqCst);
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalSpeechToText for FakeLocal {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        self.stt_calls.fetch_add(1, Ordering::SeqCst);
        Ok(transcript(wav))
    }
}

#[async_trait]
impl LocalDialogue for FakeLocal {
    async fn resolve(&self, text: &str) -> Result<String> {
        self.dialogue_calls.fetch_add(1, Ordering::SeqCst);
        if self.dialogue_fails.load(Ordering::SeqCst) {
            return Err(Error::Dialogue("model not loaded".to_string()));
        }
        Ok(format!("Local says: {text}"))
    }
}

#[async_trait]
impl LocalTextToSpeech for FakeLocal {
    async fn speak(&self, text: &str) -> Result<()> {
        self.tts_calls.fetch_add(1, Ordering::SeqCst);
        if self.tts_fails.load(Ordering::SeqCst) {
            return Err(Error::Tts("no audio device".to_string()));
        }
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Microphone that replays scripted utterances
///
/// `None` entries (and an exhausted script) are silence.
#[derive(Default)]
pub struct ScriptedAudio {
    utterances: Mutex<VecDeque<Option<String>>>,
    /// How long each capture takes, on the tokio clock
    pub capture_time: Duration,
}

impl ScriptedAudio {
    pub fn new(utterances: &[Option<&str>]) -> Arc<Self> {
        Arc::new(Self {
            utterances: Mutex::new(utterances.iter().map(|u| u.map(String::from)).collect()),
            capture_time: Duration::ZERO,
        })
    }

    pub fn slow(utterances: &[Option<&str>], capture_time: Duration) -> Arc<Self> {
        Arc::new(Self {
            utterances: Mutex::new(utterances.iter().map(|u| u.map(String::from)).collect()),
            capture_time,
        })
    }

    pub fn say(&self, text: &str) {
        self.utterances.lock().unwrap().push_back(Some(text.to_string()));
    }
}

#[async_trait]
impl AudioInput for ScriptedAudio {
    async fn capture_utterance(&self, _timeout: Duration) -> Result<Option<Vec<u8>>> {
        if !self.capture_time.is_zero() {
            tokio::time::sleep(self.capture_time).await;
        }
        let next = self.utterances.lock().unwrap().pop_front().flatten();
        Ok(next.map(String::into_bytes))
    }
}

/// What a scripted realtime fetch does
#[derive(Debug, Clone)]
pub enum Fetch {
    Value(String),
    Transient,
    Fatal,
    Hang,
}

/// Realtime source that follows a script and counts calls
///
/// Once the script runs out, the last step repeats.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Fetch>>,
    last: Mutex<Fetch>,
    pub calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(script: Vec<Fetch>) -> Arc<Self> {
        let last = script.last().cloned().unwrap_or(Fetch::Transient);
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(last),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn always(value: &str) -> Arc<Self> {
        Self::new(vec![Fetch::Value(value.to_string())])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Fetch {
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(step) => {
                *self.last.lock().unwrap() = step.clone();
                step
            }
            None => self.last.lock().unwrap().clone(),
        }
    }
}

#[async_trait]
impl RealtimeSource for ScriptedSource {
    async fn fetch(&self, query: &RealtimeQuery) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next() {
            Fetch::Value(value) => Ok(format!("{value} ({query})")),
            Fetch::Transient => Err(Error::Upstream {
                status: 503,
                body: "try later".to_string(),
            }),
            Fetch::Fatal => Err(Error::Config("missing API key".to_string())),
            Fetch::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(Error::Realtime("hung".to_string()))
            }
        }
    }
}

/// Agent over a scripted source with three attempts and an 8 s budget
pub fn agent(source: Arc<ScriptedSource>) -> RealtimeDataAgent {
    RealtimeDataAgent::new(source, RetryPolicy::with_attempts(3), Duration::from_secs(8))
}

/// Conversation log kept in memory
#[derive(Default)]
pub struct MemoryLog {
    pub records: Mutex<Vec<TurnRecord>>,
}

#[async_trait]
impl ConversationLog for MemoryLog {
    async fn record(&self, record: &TurnRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Trigger that fires a fixed number of times, then reports closed
pub struct CountdownTrigger {
    remaining: AtomicUsize,
    pub waits: AtomicUsize,
}

impl CountdownTrigger {
    pub fn new(times: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicUsize::new(times),
            waits: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl WakeTrigger for CountdownTrigger {
    async fn wait(&self) -> Result<bool> {
        self.waits.fetch_add(1, Ordering::SeqCst);
        let fired = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        Ok(fired)
    }
}

/// Settings used by session tests
pub fn settings() -> SessionSettings {
    SessionSettings {
        language: "en-IN".to_string(),
        speaker: "Anushka".to_string(),
        idle_timeout: Duration::from_secs(30),
        capture_timeout: Duration::from_secs(15),
        rules: IntentRules {
            exit_phrases: ["goodbye", "exit", "quit", "stop", "bye"]
                .into_iter()
                .map(String::from)
                .collect(),
            default_location: Some("Mumbai".to_string()),
            news_country: "in".to_string(),
        },
        weather_ttl: Duration::from_secs(600),
        news_ttl: Duration::from_secs(600),
    }
}

/// Everything a session test needs to inspect afterwards
pub struct Harness {
    pub cloud: Option<Arc<FakeCloud>>,
    pub local: Arc<FakeLocal>,
    pub audio: Arc<ScriptedAudio>,
    pub source: Arc<ScriptedSource>,
    pub log: Arc<MemoryLog>,
    pub orchestrator: SessionOrchestrator,
}

impl Harness {
    pub fn new(cloud: Option<Arc<FakeCloud>>, audio: Arc<ScriptedAudio>) -> Self {
        Self::with_source(cloud, audio, ScriptedSource::always("Current weather: +31°C Sunny"))
    }

    pub fn with_source(
        cloud: Option<Arc<FakeCloud>>,
        audio: Arc<ScriptedAudio>,
        source: Arc<ScriptedSource>,
    ) -> Self {
        let local = FakeLocal::new();
        let log = Arc::new(MemoryLog::default());

        let capabilities = Capabilities {
            cloud: cloud.as_ref().map(FakeCloud::providers),
            local_stt: local.clone(),
            dialogue: local.clone(),
            local_tts: local.clone(),
            audio: audio.clone(),
        };

        let orchestrator =
            SessionOrchestrator::new(capabilities, agent(source.clone()), settings())
                .with_history(log.clone());

        Self {
            cloud,
            local,
            audio,
            source,
            log,
            orchestrator,
        }
    }

    pub fn records(&self) -> Vec<TurnRecord> {
        self.log.records.lock().unwrap().clone()
    }
}
