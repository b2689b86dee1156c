// Integration tests for the session registry
//
// The recognition engine and broadcaster are replaced by in-memory doubles so
// each test controls exactly which recognition events a session sees.

mod common;

use common::{eventually, registry, RecordingPublisher, ScriptedEngine};
use live_transcription::{
    AudioSource, EndReason, RecognitionEvent, SessionState, TranscriptionError, STOPPED_MESSAGE,
};
use std::path::PathBuf;
use tempfile::TempDir;

fn is_line(line: &str, speaker: &str, text: &str) -> bool {
    let bytes = line.as_bytes();
    line.len() > 8
        && bytes[0] == b'['
        && bytes[3] == b':'
        && bytes[6] == b']'
        && line[1..3].chars().all(|c| c.is_ascii_digit())
        && line[4..6].chars().all(|c| c.is_ascii_digit())
        && line[7..] == format!(" Speaker {}: {}", speaker, text)
}

#[tokio::test]
async fn test_start_then_immediate_get_returns_empty() {
    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::new();
    let registry = registry(&engine, &publisher);

    registry.start_from_microphone("u1").await.unwrap();

    assert_eq!(registry.get_transcript("u1").await, "");
    assert!(registry.is_active("u1").await);
    assert_eq!(engine.started(), 1);
    assert_eq!(engine.stream(0).source, AudioSource::Microphone);
    assert_eq!(engine.stream(0).language, "en-US");
}

#[tokio::test]
async fn test_get_transcript_without_session_is_empty() {
    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::new();
    let registry = registry(&engine, &publisher);

    assert_eq!(registry.get_transcript("nobody").await, "");
    assert!(registry.status("nobody").await.is_none());
}

#[tokio::test]
async fn test_lines_keep_recognition_order() {
    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::new();
    let registry = registry(&engine, &publisher);

    registry.start_from_microphone("u1").await.unwrap();
    let stream = engine.last_stream();

    let utterances: Vec<String> = (0..20).map(|i| format!("utterance number {}", i)).collect();
    for (i, text) in utterances.iter().enumerate() {
        stream.say(&format!("Guest-{}", i % 3), text).await;
    }

    let transcript = registry.stop("u1").await.expect("session was active");
    let lines: Vec<&str> = transcript.lines().collect();

    assert_eq!(lines.len(), utterances.len());
    for (i, (line, text)) in lines.iter().zip(&utterances).enumerate() {
        assert!(
            is_line(line, &format!("Guest-{}", i % 3), text),
            "unexpected line {}: {:?}",
            i,
            line
        );
    }
    assert!(transcript.ends_with('\n'));
}

#[tokio::test]
async fn test_no_match_does_not_touch_transcript() {
    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::new();
    let registry = registry(&engine, &publisher);

    registry.start_from_microphone("u1").await.unwrap();
    let stream = engine.last_stream();

    stream
        .events
        .send(RecognitionEvent::NoMatch {
            details: "InitialSilenceTimeout".to_string(),
        })
        .await
        .unwrap();
    stream.say("Guest-1", "hello").await;

    let transcript = registry.stop("u1").await.unwrap();
    assert_eq!(transcript.lines().count(), 1);
    assert!(transcript.contains("Speaker Guest-1: hello"));
}

#[tokio::test]
async fn test_stop_without_session_is_noop() {
    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::new();
    let registry = registry(&engine, &publisher);

    assert_eq!(registry.stop("ghost").await, None);
    assert!(publisher.messages_for("ghost").is_empty());
    assert_eq!(engine.started(), 0);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::new();
    let registry = registry(&engine, &publisher);

    registry.start_from_microphone("u1").await.unwrap();
    engine.last_stream().say("Guest-1", "bye").await;

    assert!(registry.stop("u1").await.is_some());
    assert_eq!(registry.stop("u1").await, None);
    assert_eq!(registry.stop("u1").await, None);

    assert_eq!(
        publisher.messages_for("u1").last().map(String::as_str),
        Some(STOPPED_MESSAGE)
    );
    assert_eq!(
        publisher
            .messages_for("u1")
            .iter()
            .filter(|m| m.as_str() == STOPPED_MESSAGE)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_stop_waits_for_stream_and_removes_session() {
    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::new();
    let registry = registry(&engine, &publisher);

    registry.start_from_microphone("u1").await.unwrap();
    let stream = engine.last_stream();
    assert!(!stream.is_stopped());

    registry.stop("u1").await;

    assert!(stream.is_stopped(), "engine stream must be stopped before stop returns");
    assert!(!registry.is_active("u1").await);
    assert!(registry.active_users().await.is_empty());
}

#[tokio::test]
async fn test_restart_replaces_session_and_resets_transcript() {
    let temp_dir = TempDir::new().unwrap();
    let first_file = temp_dir.path().join("first.wav");
    std::fs::write(&first_file, b"RIFF").unwrap();

    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::new();
    let registry = registry(&engine, &publisher);

    registry.start_from_file("u1", &first_file).await.unwrap();
    let first = engine.last_stream();
    first.say("Guest-1", "from the first session").await;
    assert!(
        eventually(|| async { !registry.get_transcript("u1").await.is_empty() }).await
    );

    registry.start_from_microphone("u1").await.unwrap();

    assert!(first.is_stopped());
    assert!(!first_file.exists(), "first session's temp file must be deleted");
    assert_eq!(engine.started(), 2);
    assert_eq!(registry.get_transcript("u1").await, "");

    // The old stream is gone; nothing it sends can reach the new transcript
    let _ = first
        .events
        .send(RecognitionEvent::Recognized {
            speaker_id: "Guest-1".to_string(),
            text: "late".to_string(),
        })
        .await;

    let second = engine.last_stream();
    second.say("Guest-2", "from the second session").await;

    let transcript = registry.stop("u1").await.unwrap();
    assert!(transcript.contains("from the second session"));
    assert!(!transcript.contains("first session"));
    assert!(!transcript.contains("late"));
}

#[tokio::test]
async fn test_concurrent_starts_for_same_user_leave_one_session() {
    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::new();
    let registry = registry(&engine, &publisher);

    let (first, second) = tokio::join!(
        registry.start_from_microphone("u1"),
        registry.start_from_microphone("u1")
    );
    first.unwrap();
    second.unwrap();

    assert_eq!(engine.started(), 2);
    assert_eq!(registry.active_users().await, vec!["u1".to_string()]);

    // The losing stream is stopped, the surviving one keeps running
    let streams = [engine.stream(0), engine.stream(1)];
    assert!(eventually(|| async { streams.iter().filter(|s| s.is_stopped()).count() == 1 }).await);
    let survivor = streams.iter().find(|s| !s.is_stopped()).unwrap();
    assert!(
        eventually(|| async {
            publisher
                .messages_for("u1")
                .iter()
                .filter(|m| m.as_str() == STOPPED_MESSAGE)
                .count()
                == 1
        })
        .await
    );

    // Only the survivor feeds the live transcript
    survivor.say("Guest-1", "still here").await;
    assert!(
        eventually(|| async { registry.get_transcript("u1").await.contains("still here") }).await
    );
    let transcript = registry.stop("u1").await.unwrap();
    assert_eq!(transcript.lines().count(), 1);
    assert!(is_line(transcript.trim_end(), "Guest-1", "still here"));
    assert!(streams.iter().all(|s| s.is_stopped()));
}

#[tokio::test]
async fn test_sessions_are_isolated_per_user() {
    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::new();
    let registry = registry(&engine, &publisher);

    let (a, b) = tokio::join!(
        registry.start_from_microphone("alice"),
        registry.start_from_microphone("bob"),
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(registry.active_users().await, vec!["alice", "bob"]);

    // Start order is unspecified, so only disjointness is checked
    let first = engine.stream(0);
    let second = engine.stream(1);
    first.say("Guest-1", "first stream text").await;
    second.say("Guest-1", "second stream text").await;

    assert!(
        eventually(|| async {
            !registry.get_transcript("alice").await.is_empty()
                && !registry.get_transcript("bob").await.is_empty()
        })
        .await
    );

    let alice = registry.get_transcript("alice").await;
    let bob = registry.get_transcript("bob").await;

    assert_eq!(alice.lines().count(), 1);
    assert_eq!(bob.lines().count(), 1);
    assert_ne!(alice, bob);
    assert!(
        (alice.contains("first stream") && bob.contains("second stream"))
            || (alice.contains("second stream") && bob.contains("first stream"))
    );

    // Live updates follow the same attribution
    assert!(
        eventually(|| async {
            publisher.messages_for("alice") == vec![alice.clone()]
                && publisher.messages_for("bob") == vec![bob.clone()]
        })
        .await
    );
}

#[tokio::test]
async fn test_stopping_one_user_leaves_others_running() {
    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::new();
    let registry = registry(&engine, &publisher);

    registry.start_from_microphone("alice").await.unwrap();
    let alice_stream = engine.last_stream();
    registry.start_from_microphone("bob").await.unwrap();
    let bob_stream = engine.last_stream();

    registry.stop("alice").await;

    assert!(alice_stream.is_stopped());
    assert!(!bob_stream.is_stopped());

    bob_stream.say("Guest-1", "still here").await;
    assert!(
        eventually(|| async { registry.get_transcript("bob").await.contains("still here") })
            .await
    );
}

#[tokio::test]
async fn test_broadcast_follows_transcript_then_stop_marker() {
    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::new();
    let registry = registry(&engine, &publisher);

    registry.start_from_microphone("u1").await.unwrap();
    let stream = engine.last_stream();
    stream.say("Guest-1", "one").await;
    stream.say("Guest-2", "two").await;
    stream.say("Guest-1", "three").await;

    let transcript = registry.stop("u1").await.unwrap();

    let mut expected: Vec<String> = transcript.split_inclusive('\n').map(str::to_string).collect();
    expected.push(STOPPED_MESSAGE.to_string());
    assert_eq!(publisher.messages_for("u1"), expected);
}

#[tokio::test]
async fn test_publish_failures_do_not_affect_transcript() {
    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::failing();
    let registry = registry(&engine, &publisher);

    registry.start_from_microphone("u1").await.unwrap();
    let stream = engine.last_stream();
    stream.say("Guest-1", "first").await;
    stream.say("Guest-1", "second").await;

    let transcript = registry.stop("u1").await.unwrap();
    assert_eq!(transcript.lines().count(), 2);
}

#[tokio::test]
async fn test_missing_file_fails_before_session_exists() {
    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::new();
    let registry = registry(&engine, &publisher);

    let missing = PathBuf::from("/nonexistent/upload.wav");
    let result = registry.start_from_file("u1", &missing).await;

    assert!(matches!(result, Err(TranscriptionError::SourceNotFound(p)) if p == missing));
    assert_eq!(engine.started(), 0);
    assert!(!registry.is_active("u1").await);
}

#[tokio::test]
async fn test_missing_file_keeps_existing_session() {
    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::new();
    let registry = registry(&engine, &publisher);

    registry.start_from_microphone("u1").await.unwrap();
    let result = registry.start_from_file("u1", "/nonexistent/upload.wav").await;

    assert!(result.is_err());
    assert!(registry.is_active("u1").await);
    assert!(!engine.last_stream().is_stopped());
}

#[tokio::test]
async fn test_engine_start_failure_registers_nothing() {
    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::new();
    let registry = registry(&engine, &publisher);

    engine.fail_next_start();
    let result = registry.start_from_microphone("u1").await;

    assert!(matches!(result, Err(TranscriptionError::RecognitionStream(_))));
    assert!(!registry.is_active("u1").await);

    // A retry is just another start
    registry.start_from_microphone("u1").await.unwrap();
    assert!(registry.is_active("u1").await);
}

#[tokio::test]
async fn test_end_of_input_tears_session_down() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("upload.wav");
    std::fs::write(&file, b"RIFF").unwrap();

    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::new();
    let registry = registry(&engine, &publisher);

    registry.start_from_file("u1", &file).await.unwrap();
    let stream = engine.last_stream();
    stream.say("Guest-1", "whole file").await;
    stream
        .events
        .send(RecognitionEvent::Ended(EndReason::EndOfInput))
        .await
        .unwrap();

    assert!(eventually(|| async { !registry.is_active("u1").await }).await);
    assert!(eventually(|| async { !file.exists() }).await);
    assert!(stream.is_stopped());
    assert!(eventually(|| async {
        publisher.messages_for("u1").last().map(String::as_str) == Some(STOPPED_MESSAGE)
    })
    .await);

    // Already torn down: stop has nothing left to do
    assert_eq!(registry.stop("u1").await, None);
}

#[tokio::test]
async fn test_stream_error_tears_session_down() {
    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::new();
    let registry = registry(&engine, &publisher);

    registry.start_from_microphone("u1").await.unwrap();
    engine
        .last_stream()
        .events
        .send(RecognitionEvent::Ended(EndReason::Error(
            "device unplugged".to_string(),
        )))
        .await
        .unwrap();

    assert!(eventually(|| async { !registry.is_active("u1").await }).await);
    assert_eq!(registry.get_transcript("u1").await, "");
}

#[tokio::test]
async fn test_self_teardown_spares_newer_session() {
    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::new();
    let registry = registry(&engine, &publisher);

    registry.start_from_microphone("u1").await.unwrap();
    let first = engine.last_stream();
    registry.start_from_microphone("u1").await.unwrap();
    let second = engine.last_stream();

    // The first stream's late end report must not remove the second session
    let _ = first
        .events
        .send(RecognitionEvent::Ended(EndReason::EndOfInput))
        .await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(registry.is_active("u1").await);
    assert!(!second.is_stopped());
}

#[tokio::test]
async fn test_status_reports_running_session() {
    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::new();
    let registry = registry(&engine, &publisher);

    registry.start_from_microphone("u1").await.unwrap();
    let stats = registry.status("u1").await.unwrap();
    assert_eq!(stats.user_id, "u1");
    assert_eq!(stats.state, SessionState::Running);
    assert!(stats.last_activity_at.is_none());
    assert!(!stats.from_file);

    engine.last_stream().say("Guest-1", "hi").await;
    assert!(
        eventually(|| async {
            registry
                .status("u1")
                .await
                .map(|s| s.transcript_lines == 1 && s.last_activity_at.is_some())
                .unwrap_or(false)
        })
        .await
    );
}

#[tokio::test]
async fn test_stop_all_stops_every_session() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("upload.wav");
    std::fs::write(&file, b"RIFF").unwrap();

    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::new();
    let registry = registry(&engine, &publisher);

    registry.start_from_microphone("alice").await.unwrap();
    registry.start_from_file("bob", &file).await.unwrap();

    registry.stop_all().await;

    assert!(registry.active_users().await.is_empty());
    assert!(engine.stream(0).is_stopped());
    assert!(engine.stream(1).is_stopped());
    assert!(!file.exists());
}

#[tokio::test]
async fn test_save_transcript_writes_timestamped_file() {
    let temp_dir = TempDir::new().unwrap();
    let engine = ScriptedEngine::new();
    let publisher = RecordingPublisher::new();
    let registry = registry(&engine, &publisher);

    assert!(registry
        .save_transcript("u1", temp_dir.path())
        .await
        .unwrap()
        .is_none());

    registry.start_from_microphone("u1").await.unwrap();
    engine.last_stream().say("Guest-1", "keep this").await;
    assert!(eventually(|| async { !registry.get_transcript("u1").await.is_empty() }).await);

    let path = registry
        .save_transcript("u1", &temp_dir.path().join("exports"))
        .await
        .unwrap()
        .unwrap();

    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("transcription_u1_"));
    assert!(name.ends_with(".txt"));
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        registry.get_transcript("u1").await
    );
}
