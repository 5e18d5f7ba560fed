//! Session orchestration integration tests
//!
//! Runs awake windows against fake providers and checks mode selection, the
//! offline lock, realtime replies and window expiry.

use std::sync::atomic::Ordering;
use std::time::Duration;

use dali_assistant::session::{
    CLOUD_TROUBLE_NOTICE, FAREWELL_REPLY, Intent, LockReason, NO_DATA_REPLY, NO_INPUT_REPLY,
    NOT_UNDERSTOOD_REPLY, WindowState,
};
use dali_assistant::{Assistant, ConfiguredMode, Error, Mode, RealtimeQuery, ReplySource};

mod common;

use common::{CountdownTrigger, FakeCloud, Fetch, Harness, ScriptedAudio, ScriptedSource};

#[tokio::test]
async fn test_auto_window_locks_after_cloud_failure() {
    let cloud = FakeCloud::healthy();
    let audio = ScriptedAudio::new(&[Some("tell me a story"), Some("and another one")]);
    let h = Harness::new(Some(cloud.clone()), audio);

    let mut window = h.orchestrator.start_window(ConfiguredMode::Auto).await;
    assert_eq!(h.orchestrator.resolve_mode(&window), Mode::Online);

    // Turn 1 starts online, then the cloud goes down
    cloud.fail();
    let first = h.orchestrator.run_turn(&mut window).await.unwrap();

    assert_eq!(first.turn.resolved_mode, Mode::Online);
    assert!(first.turn.cloud_failed);
    assert_eq!(first.turn.reply_text, "Local says: tell me a story");
    assert_eq!(first.turn.reply_source, ReplySource::LocalDialogue);
    assert!(window.is_offline_locked());
    assert_eq!(window.lock_reason(), Some(LockReason::CloudFailure));

    // Only the failed STT call reached the cloud; the rest of the turn ran locally
    assert_eq!(cloud.calls(), 1);

    // Turn 2 stays offline even though the cloud is back
    cloud.recover();
    let second = h.orchestrator.run_turn(&mut window).await.unwrap();

    assert_eq!(second.turn.resolved_mode, Mode::Offline);
    assert!(!second.turn.cloud_failed);
    assert_eq!(second.turn.reply_text, "Local says: and another one");
    assert_eq!(cloud.calls(), 1);
    assert_eq!(window.state(), WindowState::Active { locked: true });
}

#[tokio::test]
async fn test_chat_failure_falls_back_within_the_same_turn() {
    let cloud = FakeCloud::healthy();
    let h = Harness::new(Some(cloud.clone()), ScriptedAudio::new(&[]));

    let mut window = h.orchestrator.start_window(ConfiguredMode::Online).await;
    cloud.fail();

    let result = h
        .orchestrator
        .run_text_turn(&mut window, "what is rust")
        .await
        .unwrap();

    assert_eq!(result.turn.reply_text, "Local says: what is rust");
    assert!(result.turn.cloud_failed);
    assert!(result.spoken);

    // Chat failed, so TTS was never tried in the cloud
    assert_eq!(cloud.chat_calls.load(Ordering::SeqCst), 1);
    assert_eq!(cloud.tts_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        h.local.spoken(),
        vec![CLOUD_TROUBLE_NOTICE, "Local says: what is rust"]
    );
    assert!(window.is_offline_locked());
}

#[tokio::test]
async fn test_tts_failure_after_cloud_reply_speaks_locally() {
    let cloud = FakeCloud::healthy();
    let h = Harness::new(Some(cloud.clone()), ScriptedAudio::new(&[]));

    let mut window = h.orchestrator.start_window(ConfiguredMode::Online).await;
    cloud.fail_tts();

    let result = h
        .orchestrator
        .run_text_turn(&mut window, "what is rust")
        .await
        .unwrap();

    // The reply was already produced in the cloud
    assert_eq!(result.turn.reply_source, ReplySource::Cloud);
    assert_eq!(result.turn.reply_text, "Cloud says: what is rust");
    assert!(result.turn.cloud_failed);
    assert!(result.spoken);

    assert_eq!(cloud.chat_calls.load(Ordering::SeqCst), 1);
    assert_eq!(cloud.tts_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.local.spoken(), vec!["Cloud says: what is rust"]);
    assert_eq!(window.lock_reason(), Some(LockReason::CloudFailure));

    let next = h.orchestrator.run_text_turn(&mut window, "hi").await.unwrap();
    assert_eq!(next.turn.resolved_mode, Mode::Offline);
    assert_eq!(cloud.chat_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_speaker_failure_does_not_lock_window() {
    let cloud = FakeCloud::healthy();
    let h = Harness::new(Some(cloud.clone()), ScriptedAudio::new(&[]));

    let mut window = h.orchestrator.start_window(ConfiguredMode::Auto).await;
    cloud.break_speaker();

    let result = h
        .orchestrator
        .run_text_turn(&mut window, "what is rust")
        .await
        .unwrap();

    assert_eq!(result.turn.reply_source, ReplySource::Cloud);
    assert!(!result.turn.cloud_failed);
    assert!(result.spoken);
    assert_eq!(h.local.spoken(), vec!["Cloud says: what is rust"]);
    assert!(!window.is_offline_locked());

    // The next turn still goes to the cloud
    let next = h.orchestrator.run_text_turn(&mut window, "hi").await.unwrap();
    assert_eq!(next.turn.resolved_mode, Mode::Online);
    assert_eq!(cloud.chat_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_lock_is_one_way_for_every_cloud_mode() {
    for mode in [ConfiguredMode::Online, ConfiguredMode::Auto] {
        let cloud = FakeCloud::healthy();
        let h = Harness::new(Some(cloud.clone()), ScriptedAudio::new(&[]));
        let mut window = h.orchestrator.start_window(mode).await;

        cloud.fail();
        h.orchestrator.run_text_turn(&mut window, "hi").await.unwrap();
        assert!(window.is_offline_locked(), "{mode} window should lock");

        cloud.recover();
        for _ in 0..3 {
            let result = h.orchestrator.run_text_turn(&mut window, "hi").await.unwrap();
            assert_eq!(result.turn.resolved_mode, Mode::Offline);
            assert!(window.is_offline_locked());
        }
    }
}

#[tokio::test]
async fn test_healthy_online_turn_uses_cloud() {
    let cloud = FakeCloud::healthy();
    let audio = ScriptedAudio::new(&[Some("namaste")]);
    let h = Harness::new(Some(cloud.clone()), audio);

    let mut window = h.orchestrator.start_window(ConfiguredMode::Online).await;
    let result = h.orchestrator.run_turn(&mut window).await.unwrap();

    assert_eq!(result.turn.transcript, "namaste");
    assert_eq!(result.turn.language, "hi-IN");
    assert_eq!(result.turn.reply_text, "Cloud says: namaste");
    assert_eq!(result.turn.reply_source, ReplySource::Cloud);
    assert!(result.spoken);
    assert!(!window.is_offline_locked());

    assert_eq!(cloud.calls(), 3);
    assert_eq!(h.local.stt_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.local.tts_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cloud_reply_is_shortened_for_speech() {
    let cloud = FakeCloud::healthy();
    let h = Harness::new(Some(cloud), ScriptedAudio::new(&[]));

    let mut window = h.orchestrator.start_window(ConfiguredMode::Online).await;
    let result = h
        .orchestrator
        .run_text_turn(&mut window, "One. Two. Three. Four. Five")
        .await
        .unwrap();

    assert_eq!(result.turn.reply_text, "Cloud says: One. Two. Three.");
}

#[tokio::test]
async fn test_offline_mode_never_calls_cloud() {
    let cloud = FakeCloud::healthy();
    let audio = ScriptedAudio::new(&[Some("hello"), Some("what's the news")]);
    let h = Harness::new(Some(cloud.clone()), audio);

    let mut window = h.orchestrator.start_window(ConfiguredMode::Offline).await;
    assert_eq!(h.orchestrator.resolve_mode(&window), Mode::Offline);

    let first = h.orchestrator.run_turn(&mut window).await.unwrap();
    let second = h.orchestrator.run_turn(&mut window).await.unwrap();

    assert_eq!(first.turn.reply_source, ReplySource::LocalDialogue);
    assert_eq!(second.turn.reply_source, ReplySource::Realtime);
    assert_eq!(cloud.probes.load(Ordering::SeqCst), 0);
    assert_eq!(cloud.calls(), 0);

    // Offline windows are not "locked"; they were never online
    assert!(!window.is_offline_locked());
}

#[tokio::test]
async fn test_unreachable_cloud_locks_at_window_start() {
    let cloud = FakeCloud::unreachable();
    let h = Harness::new(Some(cloud.clone()), ScriptedAudio::new(&[Some("hello")]));

    let mut window = h.orchestrator.start_window(ConfiguredMode::Online).await;

    assert!(window.is_offline_locked());
    assert!(!window.cloud_reachable());
    assert_eq!(window.lock_reason(), Some(LockReason::ProbeFailed));
    assert_eq!(cloud.probes.load(Ordering::SeqCst), 1);

    let result = h.orchestrator.run_turn(&mut window).await.unwrap();
    assert_eq!(result.turn.resolved_mode, Mode::Offline);
    assert_eq!(cloud.calls(), 0);
}

#[tokio::test]
async fn test_missing_cloud_providers_lock_auto_window() {
    let h = Harness::new(None, ScriptedAudio::new(&[]));

    let window = h.orchestrator.start_window(ConfiguredMode::Auto).await;

    assert!(window.is_offline_locked());
    assert_eq!(h.orchestrator.resolve_mode(&window), Mode::Offline);
}

#[tokio::test]
async fn test_fresh_window_starts_unlocked() {
    let cloud = FakeCloud::healthy();
    let h = Harness::new(Some(cloud.clone()), ScriptedAudio::new(&[]));

    let mut window = h.orchestrator.start_window(ConfiguredMode::Auto).await;
    cloud.fail();
    h.orchestrator.run_text_turn(&mut window, "hi").await.unwrap();
    assert!(window.is_offline_locked());
    h.orchestrator.end_window(&mut window);

    cloud.recover();
    let next = h.orchestrator.start_window(ConfiguredMode::Auto).await;

    assert_ne!(next.id(), window.id());
    assert!(!next.is_offline_locked());
    assert_eq!(h.orchestrator.resolve_mode(&next), Mode::Online);
}

#[tokio::test(start_paused = true)]
async fn test_weather_reply_comes_from_realtime_agent() {
    let h = Harness::new(
        Some(FakeCloud::healthy()),
        ScriptedAudio::new(&[Some("what's the weather in Pune today")]),
    );

    let mut window = h.orchestrator.start_window(ConfiguredMode::Auto).await;
    let result = h.orchestrator.run_turn(&mut window).await.unwrap();

    assert_eq!(
        result.turn.intent,
        Intent::Realtime(RealtimeQuery::Weather {
            location: Some("pune".to_string())
        })
    );
    assert_eq!(result.turn.reply_source, ReplySource::Realtime);
    assert!(result.turn.reply_text.starts_with("Current weather: +31°C Sunny"));
    assert_eq!(h.source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_realtime_data_apologizes() {
    let h = Harness::with_source(
        None,
        ScriptedAudio::new(&[Some("read me the headlines")]),
        ScriptedSource::new(vec![Fetch::Transient]),
    );

    let mut window = h.orchestrator.start_window(ConfiguredMode::Offline).await;
    let result = h.orchestrator.run_turn(&mut window).await.unwrap();

    assert_eq!(result.turn.reply_text, NO_DATA_REPLY);
    assert_eq!(result.turn.reply_source, ReplySource::LocalRule);
    assert_eq!(h.source.calls(), 3);
}

#[tokio::test]
async fn test_exit_phrase_ends_window() {
    let h = Harness::new(None, ScriptedAudio::new(&[Some("okay, goodbye!")]));

    let mut window = h.orchestrator.start_window(ConfiguredMode::Offline).await;
    let idle = h.orchestrator.settings().idle_timeout;
    assert!(!h.orchestrator.is_window_expired(&window, idle));

    let result = h.orchestrator.run_turn(&mut window).await.unwrap();

    assert_eq!(result.turn.intent, Intent::Exit);
    assert_eq!(result.turn.reply_text, FAREWELL_REPLY);
    assert!(window.exit_requested());
    assert!(h.orchestrator.is_window_expired(&window, idle));
    assert_eq!(h.local.dialogue_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_silence_reprompts() {
    let h = Harness::new(None, ScriptedAudio::new(&[None]));

    let mut window = h.orchestrator.start_window(ConfiguredMode::Offline).await;
    let result = h.orchestrator.run_turn(&mut window).await.unwrap();

    assert_eq!(result.turn.intent, Intent::NoInput);
    assert_eq!(result.turn.reply_text, NO_INPUT_REPLY);
    assert!(!result.turn.heard_speech());
    assert_eq!(window.turns(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_silent_turns_do_not_extend_window() {
    let h = Harness::new(None, ScriptedAudio::new(&[None]));
    let idle = h.orchestrator.settings().idle_timeout;

    let mut window = h.orchestrator.start_window(ConfiguredMode::Offline).await;

    tokio::time::advance(Duration::from_secs(20)).await;
    h.orchestrator.run_turn(&mut window).await.unwrap();
    assert!(!h.orchestrator.is_window_expired(&window, idle));

    tokio::time::advance(Duration::from_secs(11)).await;
    assert!(h.orchestrator.is_window_expired(&window, idle));
}

#[tokio::test(start_paused = true)]
async fn test_speech_extends_window() {
    let h = Harness::new(None, ScriptedAudio::new(&[Some("hello")]));
    let idle = h.orchestrator.settings().idle_timeout;

    let mut window = h.orchestrator.start_window(ConfiguredMode::Offline).await;

    tokio::time::advance(Duration::from_secs(20)).await;
    h.orchestrator.run_turn(&mut window).await.unwrap();

    tokio::time::advance(Duration::from_secs(11)).await;
    assert!(!h.orchestrator.is_window_expired(&window, idle));

    tokio::time::advance(Duration::from_secs(20)).await;
    assert!(h.orchestrator.is_window_expired(&window, idle));
}

#[tokio::test]
async fn test_ended_window_rejects_turns() {
    let h = Harness::new(None, ScriptedAudio::new(&[Some("hello")]));

    let mut window = h.orchestrator.start_window(ConfiguredMode::Offline).await;
    h.orchestrator.end_window(&mut window);

    assert_eq!(window.state(), WindowState::Ended);
    assert!(matches!(
        h.orchestrator.run_turn(&mut window).await,
        Err(Error::WindowEnded(_))
    ));
    assert!(matches!(
        h.orchestrator.run_text_turn(&mut window, "hello").await,
        Err(Error::WindowEnded(_))
    ));
}

#[tokio::test]
async fn test_local_dialogue_failure_apologizes() {
    let h = Harness::new(None, ScriptedAudio::new(&[Some("open the pod bay doors")]));
    h.local.fail_dialogue();

    let mut window = h.orchestrator.start_window(ConfiguredMode::Offline).await;
    let result = h.orchestrator.run_turn(&mut window).await.unwrap();

    assert_eq!(result.turn.reply_text, NOT_UNDERSTOOD_REPLY);
    assert_eq!(result.turn.reply_source, ReplySource::LocalRule);
    assert!(!result.turn.cloud_failed);
}

#[tokio::test]
async fn test_speech_failure_still_returns_reply() {
    let h = Harness::new(None, ScriptedAudio::new(&[Some("hello")]));
    h.local.fail_tts();

    let mut window = h.orchestrator.start_window(ConfiguredMode::Offline).await;
    let result = h.orchestrator.run_turn(&mut window).await.unwrap();

    assert!(!result.spoken);
    assert_eq!(result.turn.reply_text, "Local says: hello");
}

#[tokio::test]
async fn test_turns_are_logged() {
    let cloud = FakeCloud::healthy();
    let h = Harness::new(
        Some(cloud.clone()),
        ScriptedAudio::new(&[Some("hello"), None]),
    );

    let mut window = h.orchestrator.start_window(ConfiguredMode::Auto).await;
    h.orchestrator.run_turn(&mut window).await.unwrap();
    cloud.fail();
    h.orchestrator.run_turn(&mut window).await.unwrap();

    let records = h.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.window_id == window.id()));

    assert_eq!(records[0].mode, "online");
    assert_eq!(records[0].reply_source, "cloud");
    assert_eq!(records[0].user_text, "hello");

    // The re-prompt was still spoken online, and that TTS call failed
    assert_eq!(records[1].user_text, "");
    assert_eq!(records[1].reply_text, NO_INPUT_REPLY);
    assert!(records[1].cloud_failed);
    assert!(window.is_offline_locked());
}

#[tokio::test]
async fn test_assistant_runs_windows_until_trigger_closes() {
    let audio = ScriptedAudio::new(&[Some("hello"), Some("goodbye"), Some("bye")]);
    let Harness {
        orchestrator,
        local,
        log,
        ..
    } = Harness::new(None, audio);

    let trigger = CountdownTrigger::new(2);
    let assistant = Assistant::new(orchestrator, trigger.clone(), ConfiguredMode::Offline)
        .acknowledge_with("Yes?");

    assistant
        .run_until(std::future::pending::<()>())
        .await
        .unwrap();

    assert_eq!(trigger.waits.load(Ordering::SeqCst), 3);

    let records = log.records.lock().unwrap().clone();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].window_id, records[1].window_id);
    assert_ne!(records[1].window_id, records[2].window_id);

    let spoken = local.spoken();
    assert_eq!(spoken.iter().filter(|s| *s == "Yes?").count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_assistant_stops_on_shutdown() {
    let audio = ScriptedAudio::slow(&[], Duration::from_secs(10));
    let Harness {
        orchestrator, log, ..
    } = Harness::new(None, audio);

    let trigger = CountdownTrigger::new(usize::MAX);
    let assistant = Assistant::new(orchestrator, trigger, ConfiguredMode::Offline);

    assistant
        .run_until(tokio::time::sleep(Duration::from_secs(25)))
        .await
        .unwrap();

    // Two full silent turns fit before the shutdown at 25 s
    assert_eq!(log.records.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_idle_window_ends_and_next_wake_starts_fresh() {
    let audio = ScriptedAudio::slow(&[], Duration::from_secs(15));
    let Harness {
        orchestrator, log, ..
    } = Harness::new(None, audio);

    let trigger = CountdownTrigger::new(2);
    let assistant = Assistant::new(orchestrator, trigger, ConfiguredMode::Offline);

    assistant
        .run_until(std::future::pending::<()>())
        .await
        .unwrap();

    // Each silent capture takes 15 s, so idle passes 30 s on the third turn
    let records = log.records.lock().unwrap().clone();
    assert_eq!(records.len(), 6);
    assert_eq!(records[0].window_id, records[2].window_id);
    assert_ne!(records[2].window_id, records[3].window_id);
}
