mod common;

use airis_voice::asr::RecognizerErrorCode;
use airis_voice::commands::{AppMode, Command, CommandEvent};
use airis_voice::config::Config;
use airis_voice::dictation::DictationUpdate;
use airis_voice::registry::{Speaker, TranscriptEvent};
use airis_voice::SessionState;
use common::mock_recognizer::RecognizerCall;
use common::{commands, dictated, recorder, settle, wait, TestContext};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_start_listening_dispatches_commands() {
    let ctx = TestContext::new();
    let (seen, on_command) = recorder();

    assert!(ctx.service.start_listening(Some(on_command), None).await);
    assert_eq!(ctx.service.state(), SessionState::ListeningCommand);
    assert!(ctx.service.is_active());

    ctx.recognizer.say("Turn on the camera.");
    ctx.recognizer.say("go to seen description");
    ctx.recognizer.say("what a lovely day");
    settle().await;

    let events = seen.lock().unwrap().clone();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].command, Command::CameraOn);
    assert_eq!(
        events[1],
        CommandEvent::new(
            Command::SwitchMode(AppMode::SceneDescription),
            "scene description"
        )
    );
}

#[tokio::test(start_paused = true)]
async fn test_start_listening_twice_does_not_restart() {
    let ctx = TestContext::new();
    let (first, on_first) = recorder();
    let (second, on_second) = recorder();

    assert!(ctx.service.start_listening(Some(on_first), None).await);
    assert!(ctx.service.start_listening(Some(on_second), None).await);
    settle().await;

    assert_eq!(ctx.recognizer.calls(), vec![RecognizerCall::Start]);

    ctx.recognizer.say("turn off camera");
    settle().await;
    assert_eq!(commands(&first), vec![Command::CameraOff]);
    assert_eq!(commands(&second), vec![Command::CameraOff]);
}

#[tokio::test(start_paused = true)]
async fn test_dictation_round_trip() {
    let ctx = TestContext::new();
    let (seen, on_command) = recorder();
    let (fragments, on_dictation) = recorder::<DictationUpdate>();

    ctx.service.start_listening(Some(on_command), None).await;
    assert!(ctx.service.start_dictation(on_dictation).await);
    settle().await;

    assert_eq!(ctx.service.state(), SessionState::ListeningDictation);
    assert_eq!(
        ctx.recognizer.calls(),
        vec![
            RecognizerCall::Start,
            RecognizerCall::Stop,
            RecognizerCall::Start
        ]
    );

    ctx.recognizer.say("find my");
    ctx.recognizer.say("keys");
    settle().await;
    assert_eq!(dictated(&fragments), vec!["find my", "find my keys"]);
    assert!(commands(&seen).is_empty());

    ctx.recognizer.say("start task");
    settle().await;

    let events = seen.lock().unwrap().clone();
    assert_eq!(events, vec![CommandEvent::new(Command::StartTask, "find my keys")]);
    // The exit phrase is never dictated
    assert_eq!(dictated(&fragments).len(), 2);
    assert_eq!(ctx.service.state(), SessionState::ListeningCommand);

    // Command listening resumes after the mode switch delay
    wait(Duration::from_millis(400)).await;
    assert_eq!(ctx.recognizer.starts(), 3);
    assert!(ctx.recognizer.is_running());

    ctx.recognizer.say("yes");
    settle().await;
    assert_eq!(commands(&seen), vec![Command::StartTask, Command::Yes]);
}

#[tokio::test(start_paused = true)]
async fn test_commands_not_interpreted_during_dictation() {
    let ctx = TestContext::new();
    let (seen, on_command) = recorder();
    let (fragments, on_dictation) = recorder::<DictationUpdate>();

    ctx.service.start_listening(Some(on_command), None).await;
    ctx.service.start_dictation(on_dictation).await;
    settle().await;

    ctx.recognizer.say("turn on camera");
    settle().await;
    assert!(commands(&seen).is_empty());
    assert_eq!(dictated(&fragments), vec!["turn on camera"]);
}

#[tokio::test(start_paused = true)]
async fn test_start_listening_leaves_dictation() {
    let ctx = TestContext::new();
    let (seen, on_command) = recorder();
    let (fragments, on_dictation) = recorder::<DictationUpdate>();

    ctx.service.start_listening(Some(on_command.clone()), None).await;
    ctx.service.start_dictation(on_dictation).await;
    settle().await;
    ctx.recognizer.say("buy bread");
    settle().await;
    assert_eq!(ctx.service.state(), SessionState::ListeningDictation);

    assert!(ctx.service.start_listening(Some(on_command), None).await);
    assert_eq!(ctx.service.state(), SessionState::ListeningCommand);
    assert!(!ctx.recognizer.is_running());

    // Command listening resumes after the mode switch delay
    wait(Duration::from_millis(600)).await;
    assert_eq!(ctx.recognizer.starts(), 3);
    assert!(ctx.recognizer.is_running());

    ctx.recognizer.say("turn on camera");
    settle().await;
    assert_eq!(commands(&seen), vec![Command::CameraOn]);
    assert_eq!(dictated(&fragments), vec!["buy bread"]);
}

#[tokio::test(start_paused = true)]
async fn test_modes_are_mutually_exclusive() {
    let ctx = TestContext::new();
    let states = Arc::new(Mutex::new(Vec::new()));
    let mut changes = ctx.service.state_changes();
    let sink = states.clone();
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let state = *changes.borrow();
            sink.lock().unwrap().push(state);
        }
    });

    let (_, on_command) = recorder::<CommandEvent>();
    let (_, on_dictation) = recorder::<DictationUpdate>();
    for _ in 0..3 {
        ctx.service.start_listening(Some(on_command.clone()), None).await;
        ctx.service.start_dictation(on_dictation.clone()).await;
        settle().await;
        assert_eq!(ctx.service.state(), SessionState::ListeningDictation);
        ctx.service.stop_dictation();
        wait(Duration::from_millis(400)).await;
        assert_eq!(ctx.service.state(), SessionState::ListeningCommand);
    }

    // Every start is preceded by the end of the previous session
    let calls = ctx.recognizer.calls();
    let mut running = false;
    for call in calls {
        match call {
            RecognizerCall::Start => {
                assert!(!running, "started twice without a stop");
                running = true;
            }
            RecognizerCall::Stop | RecognizerCall::Abort => running = false,
        }
    }
    assert!(!states.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_dictation_without_command_listener_goes_idle() {
    let ctx = TestContext::new();
    let (_, on_dictation) = recorder::<DictationUpdate>();

    assert!(ctx.service.start_dictation(on_dictation).await);
    settle().await;
    assert_eq!(ctx.service.state(), SessionState::ListeningDictation);
    assert_eq!(ctx.recognizer.starts(), 1);

    ctx.service.stop_dictation();
    wait(Duration::from_millis(500)).await;
    assert_eq!(ctx.service.state(), SessionState::Idle);
    assert!(!ctx.recognizer.is_running());
    assert_eq!(ctx.recognizer.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_restart_preserves_dictation() {
    let ctx = TestContext::new();
    let (seen, on_command) = recorder();
    let (fragments, on_dictation) = recorder::<DictationUpdate>();

    ctx.service.start_listening(Some(on_command), None).await;
    ctx.service.start_dictation(on_dictation).await;
    ctx.recognizer.say("find");
    settle().await;

    ctx.service.restart_recognition();
    settle().await;
    assert_eq!(ctx.service.state(), SessionState::Restarting);

    wait(Duration::from_millis(400)).await;
    assert_eq!(ctx.service.state(), SessionState::ListeningDictation);
    assert!(ctx.recognizer.is_running());

    ctx.recognizer.say("keys");
    settle().await;
    assert_eq!(dictated(&fragments), vec!["find", "find keys"]);
    assert!(commands(&seen).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_restart_phrase_inside_dictation() {
    let ctx = TestContext::new();
    let (_, on_command) = recorder();
    let (fragments, on_dictation) = recorder::<DictationUpdate>();

    ctx.service.start_listening(Some(on_command), None).await;
    ctx.service.start_dictation(on_dictation).await;
    ctx.recognizer.say("make tea");
    ctx.recognizer.say("refresh");
    settle().await;
    assert_eq!(ctx.service.state(), SessionState::Restarting);
    assert_eq!(ctx.recognizer.count(RecognizerCall::Abort), 1);

    wait(Duration::from_millis(400)).await;
    assert_eq!(ctx.service.state(), SessionState::ListeningDictation);

    ctx.recognizer.say("please");
    settle().await;
    assert_eq!(dictated(&fragments), vec!["make tea", "make tea please"]);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_command_restarts_recognition() {
    let ctx = TestContext::new();
    let (seen, on_command) = recorder();
    ctx.service.start_listening(Some(on_command), None).await;

    ctx.recognizer.say("refresh");
    settle().await;
    assert_eq!(commands(&seen), vec![Command::Refresh]);
    assert_eq!(ctx.service.state(), SessionState::Restarting);

    wait(Duration::from_millis(400)).await;
    assert_eq!(ctx.service.state(), SessionState::ListeningCommand);
    assert_eq!(ctx.recognizer.starts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unexpected_end_auto_restarts() {
    let ctx = TestContext::new();
    let (_, on_command) = recorder();
    ctx.service.start_listening(Some(on_command), None).await;

    ctx.recognizer.end();
    settle().await;
    assert_eq!(ctx.recognizer.starts(), 1);

    wait(Duration::from_millis(150)).await;
    assert_eq!(ctx.recognizer.starts(), 2);
    assert_eq!(ctx.service.state(), SessionState::ListeningCommand);
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_is_fatal() {
    let ctx = TestContext::new();
    let (_, on_command) = recorder();
    ctx.service.start_listening(Some(on_command), None).await;

    ctx.recognizer.fail(RecognizerErrorCode::NotAllowed);
    settle().await;
    assert_eq!(ctx.service.state(), SessionState::Idle);
    assert!(!ctx.service.is_active());

    wait(Duration::from_secs(5)).await;
    assert_eq!(ctx.recognizer.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_on_start() {
    let ctx = TestContext::new();
    ctx.recognizer.deny_start.store(true, Ordering::SeqCst);

    let (_, on_command) = recorder();
    assert!(!ctx.service.start_listening(Some(on_command), None).await);
    assert!(!ctx.service.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_start_failure_retries_with_backoff() {
    let ctx = TestContext::new();
    ctx.recognizer.fail_start.store(true, Ordering::SeqCst);

    let (_, on_command) = recorder();
    assert!(ctx.service.start_listening(Some(on_command), None).await);
    assert!(!ctx.recognizer.is_running());

    // Retries at 100 ms, then 200 ms later
    wait(Duration::from_millis(150)).await;
    assert_eq!(ctx.recognizer.starts(), 2);

    ctx.recognizer.fail_start.store(false, Ordering::SeqCst);
    wait(Duration::from_millis(200)).await;
    assert_eq!(ctx.recognizer.starts(), 3);
    assert!(ctx.recognizer.is_running());
    assert_eq!(ctx.service.state(), SessionState::ListeningCommand);
}

#[tokio::test(start_paused = true)]
async fn test_network_error_backs_off() {
    let ctx = TestContext::new();
    let (_, on_command) = recorder();
    ctx.service.start_listening(Some(on_command), None).await;

    ctx.recognizer.fail(RecognizerErrorCode::Network);
    wait(Duration::from_secs(1)).await;
    assert_eq!(ctx.recognizer.starts(), 1);
    assert!(ctx.service.is_active());

    wait(Duration::from_millis(1100)).await;
    assert_eq!(ctx.recognizer.starts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_no_speech_is_not_an_error() {
    let ctx = TestContext::new();
    let (_, on_command) = recorder();
    ctx.service.start_listening(Some(on_command), None).await;

    ctx.recognizer.error(RecognizerErrorCode::NoSpeech);
    wait(Duration::from_secs(1)).await;
    assert_eq!(ctx.recognizer.calls(), vec![RecognizerCall::Start]);
    assert_eq!(ctx.service.state(), SessionState::ListeningCommand);
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted_goes_idle() {
    let config = Config {
        max_consecutive_errors: 3,
        ..Config::default()
    };
    let ctx = TestContext::with_config(config);
    let (_, on_command) = recorder();
    ctx.service.start_listening(Some(on_command), None).await;

    ctx.recognizer.fail(RecognizerErrorCode::AudioCapture);
    wait(Duration::from_millis(150)).await;
    assert_eq!(ctx.recognizer.starts(), 2);

    ctx.recognizer.fail(RecognizerErrorCode::AudioCapture);
    wait(Duration::from_millis(250)).await;
    assert_eq!(ctx.recognizer.starts(), 3);

    ctx.recognizer.fail(RecognizerErrorCode::AudioCapture);
    wait(Duration::from_secs(3)).await;
    assert_eq!(ctx.service.state(), SessionState::Idle);
    assert_eq!(ctx.recognizer.starts(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_final_result_resets_error_count() {
    let config = Config {
        max_consecutive_errors: 2,
        ..Config::default()
    };
    let ctx = TestContext::with_config(config);
    let (_, on_command) = recorder();
    ctx.service.start_listening(Some(on_command), None).await;

    for _ in 0..3 {
        ctx.recognizer.fail(RecognizerErrorCode::AudioCapture);
        wait(Duration::from_millis(150)).await;
        ctx.recognizer.say("hello there");
        settle().await;
    }
    assert_eq!(ctx.service.state(), SessionState::ListeningCommand);
    assert_eq!(ctx.recognizer.starts(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_missing_end_event_falls_back() {
    let ctx = TestContext::new();
    ctx.recognizer.end_on_stop.store(false, Ordering::SeqCst);
    let (_, on_command) = recorder();
    let (_, on_dictation) = recorder::<DictationUpdate>();

    ctx.service.start_listening(Some(on_command), None).await;
    ctx.service.start_dictation(on_dictation).await;
    settle().await;
    assert_eq!(ctx.recognizer.starts(), 1);

    wait(Duration::from_millis(250)).await;
    assert_eq!(
        ctx.recognizer.calls(),
        vec![
            RecognizerCall::Start,
            RecognizerCall::Stop,
            RecognizerCall::Abort,
            RecognizerCall::Start
        ]
    );
    assert_eq!(ctx.service.state(), SessionState::ListeningDictation);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_subscriber_is_isolated() {
    let ctx = TestContext::new();
    let (seen, on_command) = recorder();

    ctx.service
        .register_command_callback(Arc::new(|_: &CommandEvent| panic!("subscriber bug")));
    ctx.service.start_listening(Some(on_command), None).await;

    ctx.recognizer.say("enter task");
    settle().await;
    assert_eq!(commands(&seen), vec![Command::EnterTask]);
}

#[tokio::test(start_paused = true)]
async fn test_unregistered_callback_stops_receiving() {
    let ctx = TestContext::new();
    let (kept, on_kept) = recorder();
    let (dropped, on_dropped) = recorder();

    ctx.service.start_listening(Some(on_kept), None).await;
    let subscription = ctx.service.register_command_callback(on_dropped);

    ctx.recognizer.say("yes");
    settle().await;
    subscription.unregister();
    ctx.recognizer.say("no");
    settle().await;

    assert_eq!(commands(&kept), vec![Command::Yes, Command::No]);
    assert_eq!(commands(&dropped), vec![Command::Yes]);
}

#[tokio::test(start_paused = true)]
async fn test_transcripts_include_interim_results() {
    let ctx = TestContext::new();
    let (seen, on_command) = recorder();
    let (heard, on_transcript) = recorder::<TranscriptEvent>();
    ctx.service.register_transcription_callback(on_transcript);
    ctx.service.start_listening(Some(on_command), None).await;

    ctx.recognizer.interim("turn on");
    ctx.recognizer.interim("turn on camera");
    settle().await;
    assert!(commands(&seen).is_empty());

    ctx.recognizer.say("Turn on camera");
    settle().await;
    assert_eq!(commands(&seen), vec![Command::CameraOn]);

    let heard = heard.lock().unwrap().clone();
    assert_eq!(heard.len(), 3);
    assert!(heard.iter().all(|e| e.speaker == Speaker::User));
    assert!(!heard[0].is_final);
    assert!(heard[2].is_final);
    assert_eq!(heard[2].text, "Turn on camera");
}

#[tokio::test(start_paused = true)]
async fn test_stop_listening() {
    let ctx = TestContext::new();
    let (seen, on_command) = recorder();
    ctx.service.start_listening(Some(on_command), None).await;

    ctx.service.stop_listening();
    settle().await;
    assert_eq!(ctx.service.state(), SessionState::Idle);
    assert!(!ctx.recognizer.is_running());

    // No auto-restart after a requested stop
    wait(Duration::from_secs(1)).await;
    assert_eq!(ctx.recognizer.starts(), 1);

    ctx.recognizer.say("yes");
    settle().await;
    assert!(commands(&seen).is_empty());

    // Listening can be resumed
    assert!(ctx.service.start_listening(None, None).await);
    assert_eq!(ctx.recognizer.starts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_tears_down() {
    let ctx = TestContext::new();
    let (seen, on_command) = recorder();
    ctx.service.start_listening(Some(on_command), None).await;

    ctx.service.cleanup().await;
    assert_eq!(ctx.service.state(), SessionState::Idle);
    assert!(!ctx.recognizer.is_running());
    assert_eq!(ctx.recognizer.count(RecognizerCall::Abort), 1);

    ctx.recognizer.say("yes");
    settle().await;
    assert!(commands(&seen).is_empty());
    assert!(!ctx.service.start_listening(None, None).await);

    // Calls after cleanup are harmless
    ctx.service.stop_listening();
    ctx.service.restart_recognition();
    ctx.service.cleanup().await;
    assert_eq!(ctx.service.state(), SessionState::Idle);
}
