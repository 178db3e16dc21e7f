//! Tests for recording control through the session actor.
//!
//! Uses tokio's test-util time control features to verify:
//! - Pause/resume cooldown
//! - Pause limits and the server-authoritative pause count
//! - Display policy locks while recording
//! - Confirmation after settings change while paused
//! - Server stop notices
//! - Bounded waits for signaling acknowledgments
//! - Liveness pings and the recording clock

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use sc_test_utils::{MockSignaling, RosterBuilder, TestSession, TestSessionBuilder};
use session_controller::actors::SessionUpdate;
use session_controller::display_policy::{DisplayPolicy, DisplayType, PolicyReason};
use session_controller::errors::{RecordingError, SessionError};
use session_controller::recording::{
    LocalMedia, RecordingNoticeState, RecordingPhase, RecordingSpecs,
};
use session_controller::signaling::SignalingEvent;
use session_controller::transport::{LocalStream, ProducerKind};
use tokio::time::Instant;

fn camera_on() -> LocalMedia {
    LocalMedia {
        audio_on: true,
        video_on: true,
        screen_producer_id: None,
    }
}

/// A session with the local camera and microphone on.
async fn ready_session(builder: TestSessionBuilder) -> TestSession {
    let session = builder.start();
    session.handle.set_local_media(camera_on()).await.unwrap();
    session
}

// ============================================================================
// Start / stop
// ============================================================================

#[tokio::test]
async fn test_start_requires_enabled_media() {
    let mut session = TestSession::builder("Me").start();

    let err = session
        .handle
        .start_recording(RecordingSpecs::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Recording(RecordingError::MediaNotEnabled(_))
    ));
    assert_eq!(session.signaling.count("startRecordIng"), 0);

    let alerts = session.drain_alerts();
    assert!(alerts
        .iter()
        .any(|a| a.contains("before you can start recording")));

    session.shutdown().await;
}

#[tokio::test]
async fn test_stop_is_terminal() {
    let session = ready_session(TestSession::builder("Me")).await;
    let handle = &session.handle;

    handle
        .start_recording(RecordingSpecs::default())
        .await
        .unwrap();
    handle.stop_recording().await.unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.recording.phase, RecordingPhase::Stopped);
    assert!(!snapshot.recording.timer_running);
    assert!(snapshot.recording.locked_display_type.is_none());

    let err = handle
        .start_recording(RecordingSpecs::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Recording(RecordingError::AlreadyStopped)
    ));
    assert_eq!(
        session.signaling.request_names(),
        vec!["startRecordIng", "stopRecord"]
    );

    session.shutdown().await;
}

#[tokio::test]
async fn test_server_rejection_leaves_recording_idle() {
    let session = ready_session(
        TestSession::builder("Me").signaling(
            MockSignaling::builder()
                .reject("startRecordIng", "Recording is not enabled for this room")
                .build(),
        ),
    )
    .await;

    let err = session
        .handle
        .start_recording(RecordingSpecs::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Rejected { request: "startRecordIng", .. }));

    let snapshot = session.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.recording.phase, RecordingPhase::Idle);

    session.shutdown().await;
}

#[tokio::test]
async fn test_stop_tears_down_whiteboard_capture() {
    let session = ready_session(TestSession::builder("Me")).await;
    let handle = &session.handle;

    handle
        .publish_local_stream(ProducerKind::Screen, LocalStream("whiteboard".to_string()))
        .await
        .unwrap();
    handle
        .signaling_event(SignalingEvent::WhiteboardStatus {
            active: true,
            capture_active: true,
        })
        .await
        .unwrap();
    handle
        .start_recording(RecordingSpecs::default())
        .await
        .unwrap();
    handle.stop_recording().await.unwrap();

    let calls = session.transport.calls();
    assert!(calls.contains(&"connect:screen:whiteboard".to_string()));
    assert_eq!(calls.last().map(String::as_str), Some("disconnect:screen"));

    session.shutdown().await;
}

#[tokio::test]
async fn test_server_stop_notice_tears_down_whiteboard_capture() {
    let session = ready_session(TestSession::builder("Me")).await;
    let handle = &session.handle;

    handle
        .publish_local_stream(ProducerKind::Screen, LocalStream("whiteboard".to_string()))
        .await
        .unwrap();
    handle
        .signaling_event(SignalingEvent::WhiteboardStatus {
            active: true,
            capture_active: true,
        })
        .await
        .unwrap();
    handle
        .start_recording(RecordingSpecs::default())
        .await
        .unwrap();
    handle
        .signaling_event(SignalingEvent::RecordingNotice {
            state: RecordingNoticeState::Stop,
            pause_count: None,
            elapsed_ms: Some(4_000),
            lock: None,
        })
        .await
        .unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.recording.phase, RecordingPhase::Stopped);
    assert_eq!(snapshot.recording.elapsed_seconds, 4);
    assert_eq!(
        session.transport.calls().last().map(String::as_str),
        Some("disconnect:screen")
    );
    assert_eq!(session.signaling.count("stopRecord"), 0);

    session.shutdown().await;
}

// ============================================================================
// Cooldown and limits
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_pause_waits_for_cooldown() {
    let mut session = ready_session(TestSession::builder("Me")).await;
    let handle = session.handle.clone();

    handle
        .start_recording(RecordingSpecs::default())
        .await
        .unwrap();
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.recording.cooldown_remaining_secs, 15);

    let err = handle.pause_recording().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Recording(RecordingError::CooldownActive {
            cooldown_secs: 15,
            ..
        })
    ));
    assert_eq!(session.signaling.count("pauseRecord"), 0);
    assert!(session
        .drain_alerts()
        .iter()
        .any(|a| a.contains("after 15 seconds")));

    tokio::time::advance(Duration::from_secs(15)).await;

    handle.pause_recording().await.unwrap();
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.recording.phase, RecordingPhase::Paused);
    assert_eq!(snapshot.recording.elapsed_seconds, 15);
    assert_eq!(snapshot.recording.pause_count, 1);
    assert!(!snapshot.recording.timer_running);

    session.shutdown().await;
}

#[tokio::test]
async fn test_pause_limit_reached() {
    let mut session = ready_session(
        TestSession::builder("Me")
            .with_var("SC_PAUSE_COOLDOWN_SECONDS", "0")
            .with_var("SC_VIDEO_PAUSE_LIMIT", "1"),
    )
    .await;
    let handle = session.handle.clone();

    handle
        .start_recording(RecordingSpecs::default())
        .await
        .unwrap();
    handle.pause_recording().await.unwrap();
    handle.resume_recording().await.unwrap();
    session.drain_updates();

    let err = handle.pause_recording().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Recording(RecordingError::PauseLimitReached { limit: 1 })
    ));
    assert_eq!(session.signaling.count("pauseRecord"), 1);
    assert!(session
        .drain_alerts()
        .iter()
        .any(|a| a.contains("reached the limit of pauses")));

    session.shutdown().await;
}

#[tokio::test]
async fn test_pause_count_comes_from_server() {
    let session = ready_session(
        TestSession::builder("Me")
            .with_var("SC_PAUSE_COOLDOWN_SECONDS", "0")
            .signaling(MockSignaling::builder().with_pause_count(1).build()),
    )
    .await;
    let handle = &session.handle;

    handle
        .start_recording(RecordingSpecs::default())
        .await
        .unwrap();
    handle.pause_recording().await.unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.recording.pause_count, 2);

    session.shutdown().await;
}

// ============================================================================
// Display policy and confirmation
// ============================================================================

#[tokio::test]
async fn test_recording_lock_rejects_wider_display_type() {
    let mut session = ready_session(TestSession::builder("Me")).await;
    let handle = session.handle.clone();

    handle
        .start_recording(RecordingSpecs::default())
        .await
        .unwrap();
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(
        snapshot.recording.locked_display_type,
        Some(DisplayType::Video)
    );
    session.drain_updates();

    let err = handle
        .update_display_policy(DisplayPolicy {
            display_type: DisplayType::All,
            ..DisplayPolicy::default()
        })
        .await
        .unwrap_err();
    assert!(
        matches!(err, SessionError::Policy(ref v) if v.reason == PolicyReason::RecordingDisplayLock)
    );

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(
        snapshot.layout.display_policy.display_type,
        DisplayType::Video
    );
    assert!(session
        .drain_alerts()
        .iter()
        .any(|a| a.contains("recording display lock")));

    session.shutdown().await;
}

#[tokio::test]
async fn test_settings_change_while_paused_needs_confirmation() {
    let session = ready_session(
        TestSession::builder("Me").with_var("SC_PAUSE_COOLDOWN_SECONDS", "0"),
    )
    .await;
    let handle = &session.handle;

    handle
        .start_recording(RecordingSpecs::default())
        .await
        .unwrap();
    handle.pause_recording().await.unwrap();

    // No lock applies while paused.
    handle
        .update_display_policy(DisplayPolicy {
            display_type: DisplayType::Media,
            ..DisplayPolicy::default()
        })
        .await
        .unwrap();

    let err = handle.resume_recording().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Recording(RecordingError::NotConfirmed)
    ));

    handle.confirm_recording().await.unwrap();
    handle.resume_recording().await.unwrap();
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.recording.phase, RecordingPhase::Started);

    // The confirmed settings become the lock, so the policy in force stays legal.
    assert_eq!(
        snapshot.recording.locked_display_type,
        Some(DisplayType::Media)
    );
    assert_eq!(
        snapshot.layout.display_policy.display_type,
        DisplayType::Media
    );
    let policy = snapshot.layout.display_policy;
    assert_eq!(handle.update_display_policy(policy).await.unwrap(), policy);

    session.shutdown().await;
}

// ============================================================================
// Unresponsive signaling
// ============================================================================

fn hung_signaling() -> Arc<MockSignaling> {
    MockSignaling::builder()
        .with_latency(Duration::from_secs(3600))
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_hung_ack_times_out_and_frees_the_mailbox() {
    let mut session = ready_session(
        TestSession::builder("Me")
            .with_var("SC_SIGNALING_TIMEOUT_SECONDS", "5")
            .signaling(hung_signaling()),
    )
    .await;
    let handle = session.handle.clone();

    let started = Instant::now();
    let err = handle
        .start_recording(RecordingSpecs::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Signaling(_)));
    assert!(started.elapsed() < Duration::from_secs(3600));

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.recording.phase, RecordingPhase::Idle);
    assert!(session
        .drain_alerts()
        .iter()
        .any(|a| a.contains("Unable to reach the server")));

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_cancel_abandons_pending_ack() {
    let session = ready_session(
        TestSession::builder("Me")
            .with_var("SC_SIGNALING_TIMEOUT_SECONDS", "600")
            .signaling(hung_signaling()),
    )
    .await;

    let handle = session.handle.clone();
    let pending =
        tokio::spawn(async move { handle.start_recording(RecordingSpecs::default()).await });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    let started = Instant::now();
    session.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(600));

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(SessionError::Internal(_))));
}

// ============================================================================
// Intervals
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_recording_clock_ticks_while_running() {
    let mut session = ready_session(TestSession::builder("Me")).await;
    let handle = session.handle.clone();

    handle
        .start_recording(RecordingSpecs::default())
        .await
        .unwrap();
    session.drain_updates();

    tokio::time::advance(Duration::from_secs(3)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    let ticked = session.drain_updates().into_iter().any(|u| {
        matches!(u, SessionUpdate::RecordingClock(clock) if clock.elapsed_seconds >= 1)
    });
    assert!(ticked);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_liveness_ping_runs_while_room_is_occupied() {
    let session = TestSession::builder("Me")
        .with_var("SC_LIVENESS_INTERVAL_SECONDS", "5")
        .start();

    session
        .handle
        .signaling_event(RosterBuilder::new().host("Host").member("Me").event())
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(5)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(session.signaling.count("stillThere"), 1);

    session.shutdown().await;
}
