//! Message types for the session actor.
//!
//! Intents and signaling events reach the actor through `tokio::sync::mpsc`;
//! replies use `tokio::sync::oneshot`. Everything the render layer consumes
//! leaves the actor as a [`SessionUpdate`].

use crate::classifier::{ClassifiedStream, PrimaryWindow};
use crate::display_policy::DisplayPolicy;
use crate::errors::{AlertKind, SessionError};
use crate::layout::{GridBudget, GridLayout, StreamRef};
use crate::recording::{LocalMedia, RecordingSession, RecordingSpecs};
use crate::registry::Participant;
use crate::screen_share::ScreenShareState;
use crate::signaling::{RequestSettings, SignalingEvent};
use crate::transport::{LocalStream, ProducerKind};
use chrono::{DateTime, Utc};
use common::types::MediaKind;
use serde::Serialize;
use tokio::sync::oneshot;

/// Messages sent to `SessionActor`.
#[derive(Debug)]
pub enum SessionMessage {
    /// An event pushed by the signaling channel.
    Signaling {
        event: SignalingEvent,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    StartRecording {
        specs: RecordingSpecs,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    PauseRecording {
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    ResumeRecording {
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    StopRecording {
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// User confirmed the current recording settings.
    ConfirmRecording { respond_to: oneshot::Sender<()> },

    /// Request a display policy change; replies with the policy in force.
    UpdateDisplayPolicy {
        policy: DisplayPolicy,
        respond_to: oneshot::Sender<Result<DisplayPolicy, SessionError>>,
    },

    /// Viewport budget changed.
    SetGridBudget {
        budget: GridBudget,
        respond_to: oneshot::Sender<GridLayout>,
    },

    /// Select a grid page; replies with the clamped page.
    SetPage {
        page: usize,
        respond_to: oneshot::Sender<usize>,
    },

    /// Local camera/microphone/screen state changed.
    SetLocalMedia {
        media: LocalMedia,
        respond_to: oneshot::Sender<()>,
    },

    /// Publish (or replace) a local capture stream.
    PublishLocalStream {
        kind: ProducerKind,
        stream: LocalStream,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Stop publishing a local capture stream.
    UnpublishLocalStream {
        kind: ProducerKind,
        respond_to: oneshot::Sender<()>,
    },

    /// Host/co-host mutes a participant.
    MuteParticipant {
        name: String,
        kind: MediaKind,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Host/co-host removes (and optionally bans) a participant.
    RemoveParticipant {
        name: String,
        ban: bool,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Host/co-host changes per-feature request permissions.
    UpdateRequestSettings {
        settings: RequestSettings,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Get an immutable snapshot of the session.
    GetSnapshot {
        respond_to: oneshot::Sender<SessionSnapshot>,
    },
}

/// A user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
}

impl Alert {
    #[must_use]
    pub fn new(kind: AlertKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// What the render layer draws.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutView {
    pub primary: PrimaryWindow,
    pub primary_streams: Vec<StreamRef>,
    pub self_view: Option<StreamRef>,
    pub grid: GridLayout,
    pub display_policy: DisplayPolicy,
    pub breakout_active: bool,
    pub whiteboard_active: bool,
}

/// Outbound updates for the render layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "update", content = "data", rename_all = "camelCase")]
pub enum SessionUpdate {
    Layout(LayoutView),
    Alert(Alert),
    RecordingClock(RecordingSession),
    ScreenShare(ScreenShareState),
}

/// Immutable projection of the session state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub room_name: String,
    pub member_name: String,
    pub participants: Vec<Participant>,
    pub co_host: Option<String>,
    pub streams: Vec<ClassifiedStream>,
    pub layout: LayoutView,
    pub screen_share: ScreenShareState,
    pub recording: RecordingSession,
    pub requested_policy: DisplayPolicy,
    pub request_settings: RequestSettings,
    pub breakout_rooms: Vec<Vec<String>>,
    pub local_media: LocalMedia,
    pub taken_at: DateTime<Utc>,
}
