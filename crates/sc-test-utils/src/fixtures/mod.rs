//! Pre-configured test data fixtures for session controller testing.
//!
//! Provides builders and test data for:
//! - Participants with different roles (host, member, sharing, banned)
//! - Roster snapshots as `allMembers` events
//! - Session configuration
//! - A spawned session actor wired to the mocks

use crate::mock_signaling::MockSignaling;
use crate::mock_transport::MockTransport;
use common::types::{MediaKind, ParticipantLevel, TrackId};
use session_controller::actors::{
    SessionActor, SessionActorHandle, SessionMetrics, SessionUpdate,
};
use session_controller::config::Config;
use session_controller::registry::Participant;
use session_controller::signaling::SignalingEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Audio track id used by the fixtures for `name`.
#[must_use]
pub fn audio_track(name: &str) -> TrackId {
    TrackId::new(format!("a-{}", name.to_lowercase()))
}

/// Video track id used by the fixtures for `name`.
#[must_use]
pub fn video_track(name: &str) -> TrackId {
    TrackId::new(format!("v-{}", name.to_lowercase()))
}

/// Screen track id used by the fixtures for `name`.
#[must_use]
pub fn screen_track(name: &str) -> TrackId {
    TrackId::new(format!("s-{}", name.to_lowercase()))
}

/// Test participant fixture.
#[derive(Debug, Clone)]
pub struct TestParticipant {
    participant: Participant,
}

impl TestParticipant {
    /// An ordinary participant with audio and video tracks.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            participant: Participant {
                id: format!("part-{}", Uuid::new_v4()),
                name: name.to_string(),
                audio_track_id: audio_track(name),
                video_track_id: video_track(name),
                video_on: true,
                ..Participant::default()
            },
        }
    }

    /// A host-level participant.
    #[must_use]
    pub fn host(name: &str) -> Self {
        Self::new(name).with_level(ParticipantLevel::Host)
    }

    /// Set the privilege level.
    #[must_use]
    pub fn with_level(mut self, level: ParticipantLevel) -> Self {
        self.participant.level = level;
        self
    }

    /// Mark the participant as sharing `track`.
    #[must_use]
    pub fn sharing(mut self, track: TrackId) -> Self {
        self.participant.screen_track_id = Some(track);
        self.participant.screen_on = true;
        self
    }

    /// Mark the participant as banned.
    #[must_use]
    pub fn banned(mut self) -> Self {
        self.participant.banned = true;
        self
    }

    /// Mark the participant as suspended.
    #[must_use]
    pub fn suspended(mut self) -> Self {
        self.participant.suspended = true;
        self
    }

    /// Drop the participant's tracks (joined, nothing produced yet).
    #[must_use]
    pub fn without_tracks(mut self) -> Self {
        self.participant.audio_track_id = TrackId::default();
        self.participant.video_track_id = TrackId::default();
        self
    }

    /// The roster entry.
    #[must_use]
    pub fn build(self) -> Participant {
        self.participant
    }
}

/// Builder for roster snapshots.
#[derive(Debug, Clone, Default)]
pub struct RosterBuilder {
    participants: Vec<Participant>,
    co_host: Option<String>,
}

impl RosterBuilder {
    /// An empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host-level participant.
    #[must_use]
    pub fn host(self, name: &str) -> Self {
        self.with(TestParticipant::host(name))
    }

    /// Add an ordinary participant.
    #[must_use]
    pub fn member(self, name: &str) -> Self {
        self.with(TestParticipant::new(name))
    }

    /// Add an ordinary participant sharing their screen.
    #[must_use]
    pub fn sharing(self, name: &str) -> Self {
        self.with(TestParticipant::new(name).sharing(screen_track(name)))
    }

    /// Add a banned participant.
    #[must_use]
    pub fn banned(self, name: &str) -> Self {
        self.with(TestParticipant::new(name).banned())
    }

    /// Add any participant fixture.
    #[must_use]
    pub fn with(mut self, participant: TestParticipant) -> Self {
        self.participants.push(participant.build());
        self
    }

    /// Set the co-host carried with the snapshot.
    #[must_use]
    pub fn co_host(mut self, name: &str) -> Self {
        self.co_host = Some(name.to_string());
        self
    }

    /// The participants in insertion order.
    #[must_use]
    pub fn build(self) -> Vec<Participant> {
        self.participants
    }

    /// The snapshot as an `allMembers` event.
    #[must_use]
    pub fn event(self) -> SignalingEvent {
        SignalingEvent::AllMembers {
            participants: self.participants,
            co_host: self.co_host,
        }
    }
}

/// `producerResumed` for a track owned by `name`.
#[must_use]
pub fn resumed(track: TrackId, kind: MediaKind, name: &str) -> SignalingEvent {
    SignalingEvent::ProducerResumed {
        producer_id: track,
        kind,
        name: Some(name.to_string()),
    }
}

/// Session configuration for `member` with optional `SC_*` overrides.
///
/// Liveness pings and the metrics recorder are off unless overridden.
#[must_use]
pub fn test_config(member: &str, overrides: &[(&str, &str)]) -> Config {
    let mut vars = HashMap::from([
        ("SC_MEMBER_NAME".to_string(), member.to_string()),
        ("SC_ROOM_NAME".to_string(), "test-room".to_string()),
        ("SC_SESSION_ID".to_string(), format!("session-{}", Uuid::new_v4())),
        ("SC_LIVENESS_INTERVAL_SECONDS".to_string(), "0".to_string()),
        ("SC_METRICS_ENABLED".to_string(), "false".to_string()),
        ("SC_TEARDOWN_DELAY_MS".to_string(), "0".to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert((*key).to_string(), (*value).to_string());
    }
    Config::from_vars(&vars).unwrap()
}

/// A running session actor wired to mocks.
pub struct TestSession {
    pub handle: SessionActorHandle,
    pub updates: mpsc::Receiver<SessionUpdate>,
    pub signaling: Arc<MockSignaling>,
    pub transport: Arc<MockTransport>,
    pub metrics: Arc<SessionMetrics>,
    pub task: JoinHandle<()>,
}

impl TestSession {
    /// Builder for a session joined as `member`.
    #[must_use]
    pub fn builder(member: &str) -> TestSessionBuilder {
        TestSessionBuilder {
            member: member.to_string(),
            overrides: Vec::new(),
            signaling: None,
            transport: None,
        }
    }

    /// Drain every update emitted so far.
    pub fn drain_updates(&mut self) -> Vec<SessionUpdate> {
        let mut drained = Vec::new();
        while let Ok(update) = self.updates.try_recv() {
            drained.push(update);
        }
        drained
    }

    /// Messages of every alert emitted so far (drains the channel).
    pub fn drain_alerts(&mut self) -> Vec<String> {
        self.drain_updates()
            .into_iter()
            .filter_map(|update| match update {
                SessionUpdate::Alert(alert) => Some(alert.message),
                _ => None,
            })
            .collect()
    }

    /// Cancel the actor and wait for it to stop.
    pub async fn shutdown(self) {
        self.handle.cancel();
        self.task.await.unwrap();
    }
}

/// Builder for [`TestSession`].
pub struct TestSessionBuilder {
    member: String,
    overrides: Vec<(String, String)>,
    signaling: Option<Arc<MockSignaling>>,
    transport: Option<Arc<MockTransport>>,
}

impl TestSessionBuilder {
    /// Override one `SC_*` configuration variable.
    #[must_use]
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.overrides.push((key.to_string(), value.to_string()));
        self
    }

    /// Use a preconfigured signaling mock.
    #[must_use]
    pub fn signaling(mut self, signaling: Arc<MockSignaling>) -> Self {
        self.signaling = Some(signaling);
        self
    }

    /// Use a preconfigured transport mock.
    #[must_use]
    pub fn transport(mut self, transport: Arc<MockTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Spawn the actor. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn start(self) -> TestSession {
        let overrides: Vec<(&str, &str)> = self
            .overrides
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let config = test_config(&self.member, &overrides);
        let signaling = self.signaling.unwrap_or_else(MockSignaling::accepting);
        let transport = self.transport.unwrap_or_else(MockTransport::new);
        let metrics = SessionMetrics::new();
        let (tx, updates) = mpsc::channel(1024);

        let (handle, task) = SessionActor::spawn(
            &config,
            Arc::clone(&signaling) as _,
            Arc::clone(&transport) as _,
            tx,
            CancellationToken::new(),
            Arc::clone(&metrics),
        );

        TestSession {
            handle,
            updates,
            signaling,
            transport,
            metrics,
            task,
        }
    }
}
