//! Signaling channel seam: consumed events, issued requests and acks.
//!
//! Events arrive as JSON objects tagged by `event`; requests are emitted
//! tagged by `request`. The channel itself is external and consumed through
//! [`SignalingChannel`]. [`request_checked`] is the only way the session
//! issues requests: it bounds and times the round trip and turns a
//! `success: false` ack into [`SessionError::Rejected`].

use crate::display_policy::RecordingLock;
use crate::errors::SessionError;
use crate::observability::metrics;
use crate::recording::{RecordingNoticeState, RecordingSpecs};
use crate::registry::Participant;
use async_trait::async_trait;
use common::types::{MediaKind, TrackId};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Breakout session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakoutStatus {
    Started,
    Ended,
}

/// Events pushed by the signaling channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum SignalingEvent {
    /// Full roster snapshot.
    AllMembers {
        participants: Vec<Participant>,
        #[serde(default)]
        co_host: Option<String>,
    },
    ProducerResumed {
        producer_id: TrackId,
        kind: MediaKind,
        #[serde(default)]
        name: Option<String>,
    },
    ProducerPaused {
        producer_id: TrackId,
        kind: MediaKind,
        #[serde(default)]
        name: Option<String>,
    },
    ProducerClosed {
        producer_id: TrackId,
    },
    /// A screen producer exists; its owner may not be on the roster yet.
    ScreenProducerId {
        producer_id: TrackId,
    },
    RecordingNotice {
        state: RecordingNoticeState,
        #[serde(default)]
        pause_count: Option<u32>,
        #[serde(default)]
        elapsed_ms: Option<u64>,
        #[serde(default)]
        lock: Option<RecordingLock>,
    },
    UpdatedCoHost {
        co_host: String,
    },
    /// Ban or removal of a participant.
    ParticipantRemoved {
        name: String,
        #[serde(default)]
        banned: bool,
    },
    BreakoutRoomUpdated {
        status: BreakoutStatus,
        #[serde(default)]
        rooms: Vec<Vec<String>>,
    },
    WhiteboardStatus {
        active: bool,
        #[serde(default)]
        capture_active: bool,
    },
}

impl SignalingEvent {
    /// Event name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            SignalingEvent::AllMembers { .. } => "allMembers",
            SignalingEvent::ProducerResumed { .. } => "producerResumed",
            SignalingEvent::ProducerPaused { .. } => "producerPaused",
            SignalingEvent::ProducerClosed { .. } => "producerClosed",
            SignalingEvent::ScreenProducerId { .. } => "screenProducerId",
            SignalingEvent::RecordingNotice { .. } => "recordingNotice",
            SignalingEvent::UpdatedCoHost { .. } => "updatedCoHost",
            SignalingEvent::ParticipantRemoved { .. } => "participantRemoved",
            SignalingEvent::BreakoutRoomUpdated { .. } => "breakoutRoomUpdated",
            SignalingEvent::WhiteboardStatus { .. } => "whiteboardStatus",
        }
    }
}

/// Per-feature request permissions pushed with `updateSettingsForRequests`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSettings {
    pub audio: String,
    pub video: String,
    pub screenshare: String,
    pub chat: String,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            audio: "allow".to_string(),
            video: "allow".to_string(),
            screenshare: "allow".to_string(),
            chat: "allow".to_string(),
        }
    }
}

/// Requests emitted to the signaling channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "request",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum SignalingRequest {
    /// Mute a participant's media.
    ControlMedia {
        participant_name: String,
        media_type: MediaKind,
        room_name: String,
    },
    /// Remove (and optionally ban) a participant.
    DisconnectUser {
        member: String,
        ban: bool,
        room_name: String,
    },
    #[serde(rename = "startRecordIng")]
    StartRecording {
        room_name: String,
        member: String,
        specs: RecordingSpecs,
    },
    PauseRecord {
        room_name: String,
        member: String,
    },
    ResumeRecord {
        room_name: String,
        member: String,
    },
    StopRecord {
        room_name: String,
        member: String,
    },
    UpdateSettingsForRequests {
        settings: RequestSettings,
        room_name: String,
    },
    /// Liveness ping.
    StillThere {
        member: String,
        room_name: String,
    },
}

impl SignalingRequest {
    /// Wire name, also the metric label.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            SignalingRequest::ControlMedia { .. } => "controlMedia",
            SignalingRequest::DisconnectUser { .. } => "disconnectUser",
            SignalingRequest::StartRecording { .. } => "startRecordIng",
            SignalingRequest::PauseRecord { .. } => "pauseRecord",
            SignalingRequest::ResumeRecord { .. } => "resumeRecord",
            SignalingRequest::StopRecord { .. } => "stopRecord",
            SignalingRequest::UpdateSettingsForRequests { .. } => "updateSettingsForRequests",
            SignalingRequest::StillThere { .. } => "stillThere",
        }
    }
}

/// Acknowledgment of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalingAck {
    pub success: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub pause_count: Option<u32>,
}

impl SignalingAck {
    /// A bare successful ack.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// A rejection with a server reason.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Emit/acknowledge surface of the signaling channel.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Send a request and await its acknowledgment.
    ///
    /// Implementations return `Err` only when the ack could not be obtained;
    /// a delivered `success: false` ack is returned as `Ok`.
    async fn request(&self, request: SignalingRequest) -> Result<SignalingAck, SessionError>;
}

/// Issue a request, record its latency and reject `success: false` acks.
///
/// # Errors
///
/// Returns the channel error, [`SessionError::Signaling`] when no ack
/// arrives within `timeout`, or [`SessionError::Rejected`] carrying the
/// server reason.
pub async fn request_checked(
    channel: &dyn SignalingChannel,
    request: SignalingRequest,
    timeout: Duration,
) -> Result<SignalingAck, SessionError> {
    let name = request.name();
    let started = Instant::now();
    let result = tokio::time::timeout(timeout, channel.request(request))
        .await
        .unwrap_or_else(|_| {
            Err(SessionError::Signaling(format!(
                "{name} not acknowledged within {}ms",
                timeout.as_millis()
            )))
        });
    metrics::record_signaling_latency(name, started.elapsed());

    let ack = result.map_err(|e| {
        warn!(target: "sc.actor.session", request = name, error = %e, "Signaling request failed");
        e
    })?;
    if !ack.success {
        let reason = ack
            .reason
            .unwrap_or_else(|| format!("{name} was rejected by the server"));
        warn!(target: "sc.actor.session", request = name, reason = %reason, "Signaling request rejected");
        return Err(SessionError::Rejected {
            request: name,
            reason,
        });
    }
    debug!(target: "sc.actor.session", request = name, "Signaling request acknowledged");
    Ok(ack)
}
