//! Headless replay of a session from newline-delimited JSON.
//!
//! Each input line is either a signaling event (`{"event": ...}`) or a user
//! intent (`{"intent": ...}`). The binary feeds them to a `SessionActor`
//! wired to [`ReplaySignaling`] and [`ReplayTransport`], which acknowledge
//! everything locally, and prints every `SessionUpdate` as JSON.

use crate::actors::SessionActorHandle;
use crate::display_policy::DisplayPolicy;
use crate::errors::SessionError;
use crate::layout::GridBudget;
use crate::recording::{LocalMedia, RecordingSpecs};
use crate::signaling::{
    RequestSettings, SignalingAck, SignalingChannel, SignalingEvent, SignalingRequest,
};
use crate::transport::{LocalStream, MediaTransport, ProducerKind, TransportError};
use async_trait::async_trait;
use common::types::{MediaKind, TrackId};
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::debug;

/// Signaling channel that acknowledges every request locally.
///
/// Pause acknowledgments carry an incrementing pause count, standing in for
/// the server's authoritative counter.
#[derive(Debug, Default)]
pub struct ReplaySignaling {
    pause_count: AtomicU32,
}

impl ReplaySignaling {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalingChannel for ReplaySignaling {
    async fn request(&self, request: SignalingRequest) -> Result<SignalingAck, SessionError> {
        debug!(target: "sc.replay", request = request.name(), "Acknowledging request");
        let ack = match request {
            SignalingRequest::PauseRecord { .. } => SignalingAck {
                pause_count: Some(self.pause_count.fetch_add(1, Ordering::Relaxed) + 1),
                ..SignalingAck::ok()
            },
            SignalingRequest::StartRecording { .. } => {
                self.pause_count.store(0, Ordering::Relaxed);
                SignalingAck::ok()
            }
            _ => SignalingAck::ok(),
        };
        Ok(ack)
    }
}

/// Media transport that only logs.
#[derive(Debug, Default)]
pub struct ReplayTransport;

#[async_trait]
impl MediaTransport for ReplayTransport {
    async fn create_send_transport(&self) -> Result<(), TransportError> {
        debug!(target: "sc.replay", "create send transport");
        Ok(())
    }

    async fn connect_send_transport(
        &self,
        kind: ProducerKind,
        stream: &LocalStream,
    ) -> Result<(), TransportError> {
        debug!(target: "sc.replay", kind = kind.as_str(), stream = %stream.0, "connect send transport");
        Ok(())
    }

    async fn disconnect_send_transport(&self, kind: ProducerKind) -> Result<(), TransportError> {
        debug!(target: "sc.replay", kind = kind.as_str(), "disconnect send transport");
        Ok(())
    }

    async fn close_producer(&self, kind: ProducerKind) -> Result<(), TransportError> {
        debug!(target: "sc.replay", kind = kind.as_str(), "close producer");
        Ok(())
    }

    async fn close_consumer(&self, track: &TrackId) -> Result<(), TransportError> {
        debug!(target: "sc.replay", track = %track, "close consumer");
        Ok(())
    }
}

/// User intents accepted by the replay input.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    tag = "intent",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ReplayIntent {
    StartRecording {
        #[serde(default)]
        specs: RecordingSpecs,
    },
    PauseRecording,
    ResumeRecording,
    StopRecording,
    ConfirmRecording,
    UpdateDisplayPolicy {
        policy: DisplayPolicy,
    },
    SetGridBudget {
        rows: usize,
        cols: usize,
    },
    SetPage {
        page: usize,
    },
    SetLocalMedia {
        media: LocalMedia,
    },
    PublishLocalStream {
        kind: ProducerKind,
        stream: LocalStream,
    },
    UnpublishLocalStream {
        kind: ProducerKind,
    },
    MuteParticipant {
        name: String,
        kind: MediaKind,
    },
    RemoveParticipant {
        name: String,
        #[serde(default)]
        ban: bool,
    },
    UpdateRequestSettings {
        settings: RequestSettings,
    },
    Snapshot,
    /// Let time pass (recording clock, cooldowns).
    Wait {
        ms: u64,
    },
}

impl ReplayIntent {
    /// Apply the intent; returns a JSON result for intents that produce one.
    ///
    /// # Errors
    ///
    /// Returns the intent's rejection.
    pub async fn apply(self, handle: &SessionActorHandle) -> Result<Option<Value>, SessionError> {
        let value = match self {
            ReplayIntent::StartRecording { specs } => {
                handle.start_recording(specs).await?;
                None
            }
            ReplayIntent::PauseRecording => {
                handle.pause_recording().await?;
                None
            }
            ReplayIntent::ResumeRecording => {
                handle.resume_recording().await?;
                None
            }
            ReplayIntent::StopRecording => {
                handle.stop_recording().await?;
                None
            }
            ReplayIntent::ConfirmRecording => {
                handle.confirm_recording().await?;
                None
            }
            ReplayIntent::UpdateDisplayPolicy { policy } => {
                let applied = handle.update_display_policy(policy).await?;
                Some(to_value(&applied)?)
            }
            ReplayIntent::SetGridBudget { rows, cols } => {
                let layout = handle.set_grid_budget(GridBudget::new(rows, cols)).await?;
                Some(to_value(&layout)?)
            }
            ReplayIntent::SetPage { page } => {
                let page = handle.set_page(page).await?;
                Some(Value::from(page))
            }
            ReplayIntent::SetLocalMedia { media } => {
                handle.set_local_media(media).await?;
                None
            }
            ReplayIntent::PublishLocalStream { kind, stream } => {
                handle.publish_local_stream(kind, stream).await?;
                None
            }
            ReplayIntent::UnpublishLocalStream { kind } => {
                handle.unpublish_local_stream(kind).await?;
                None
            }
            ReplayIntent::MuteParticipant { name, kind } => {
                handle.mute_participant(name, kind).await?;
                None
            }
            ReplayIntent::RemoveParticipant { name, ban } => {
                handle.remove_participant(name, ban).await?;
                None
            }
            ReplayIntent::UpdateRequestSettings { settings } => {
                handle.update_request_settings(settings).await?;
                None
            }
            ReplayIntent::Snapshot => {
                let snapshot = handle.snapshot().await?;
                Some(to_value(&snapshot)?)
            }
            ReplayIntent::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                None
            }
        };
        Ok(value)
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, SessionError> {
    serde_json::to_value(value)
        .map_err(|e| SessionError::Internal(format!("result serialization failed: {e}")))
}

/// One replay input line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ReplayLine {
    Event(SignalingEvent),
    Intent(ReplayIntent),
}

impl ReplayLine {
    /// Parse one line. Blank lines and `#` comments yield `None`.
    ///
    /// # Errors
    ///
    /// Returns the JSON error for malformed lines.
    pub fn parse(line: &str) -> Result<Option<Self>, serde_json::Error> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }
        serde_json::from_str(trimmed).map(Some)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::display_policy::DisplayType;

    #[test]
    fn test_parse_event_line() {
        let line = r#"{"event":"producerResumed","producerId":"v-host","kind":"video","name":"Host"}"#;
        let parsed = ReplayLine::parse(line).unwrap().unwrap();
        assert!(matches!(
            parsed,
            ReplayLine::Event(SignalingEvent::ProducerResumed { ref producer_id, .. })
                if producer_id.as_str() == "v-host"
        ));
    }

    #[test]
    fn test_parse_intent_line() {
        let line = r#"{"intent":"updateDisplayPolicy","policy":{"displayType":"all"}}"#;
        let parsed = ReplayLine::parse(line).unwrap().unwrap();
        assert!(matches!(
            parsed,
            ReplayLine::Intent(ReplayIntent::UpdateDisplayPolicy { policy })
                if policy.display_type == DisplayType::All
        ));

        let parsed = ReplayLine::parse(r#"{"intent":"pauseRecording"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(parsed, ReplayLine::Intent(ReplayIntent::PauseRecording));
    }

    #[test]
    fn test_skips_blank_and_comment_lines() {
        assert!(ReplayLine::parse("   ").unwrap().is_none());
        assert!(ReplayLine::parse("# roster first").unwrap().is_none());
        assert!(ReplayLine::parse("{not json").is_err());
    }

    #[tokio::test]
    async fn test_replay_signaling_counts_pauses() {
        let signaling = ReplaySignaling::new();
        let pause = || SignalingRequest::PauseRecord {
            room_name: "room".to_string(),
            member: "Me".to_string(),
        };

        assert_eq!(signaling.request(pause()).await.unwrap().pause_count, Some(1));
        assert_eq!(signaling.request(pause()).await.unwrap().pause_count, Some(2));
    }
}
