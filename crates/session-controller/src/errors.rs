//! Session controller error types.
//!
//! Every error maps onto one of four reporting classes:
//! - policy violations and recording-state conflicts: danger alert, state unchanged
//! - signaling rejections (`success: false` acks): danger alert with the server reason
//! - classification lookup misses: never raised, handled by placeholder fallback
//! - teardown failures: logged, never surfaced

use crate::display_policy::PolicyViolation;
use crate::transport::TransportError;
use common::types::MediaKind;
use serde::Serialize;
use thiserror::Error;

/// Severity of an alert shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    /// Informational notice.
    Info,
    /// Operation succeeded.
    Success,
    /// Operation rejected or failed.
    Danger,
}

/// Session controller error type.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Signaling channel could not deliver a request or returned garbage.
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// Server acknowledged a request with `success: false`.
    #[error("Request {request} rejected: {reason}")]
    Rejected {
        request: &'static str,
        reason: String,
    },

    /// Media transport failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Display policy change conflicts with an active lock.
    #[error("Policy violation: {0}")]
    Policy(#[from] PolicyViolation),

    /// Recording state machine rejected a transition.
    #[error("Recording error: {0}")]
    Recording(#[from] RecordingError),

    /// Participant not found in the roster.
    #[error("Participant not found: {0}")]
    ParticipantNotFound(String),

    /// Local participant lacks moderation rights.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Internal error (actor mailbox closed, response dropped).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Recording state machine rejections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordingError {
    /// Chosen media option needs a local track that is off.
    #[error("You must turn on your {} before you can start recording", .0.as_str())]
    MediaNotEnabled(MediaKind),

    /// Recording has not been started.
    #[error("Recording has not started")]
    NotStarted,

    /// Recording already in progress.
    #[error("Recording is already in progress")]
    AlreadyStarted,

    /// Recording has been stopped for this session.
    #[error("Recording has already been stopped")]
    AlreadyStopped,

    /// Recording is not paused.
    #[error("Recording is not paused")]
    NotPaused,

    /// The elapsed-time ticker is not running.
    #[error("Recording timer is not running")]
    TimerNotRunning,

    /// Pause/resume attempted inside the cooldown window.
    #[error(
        "You can only pause or resume after {cooldown_secs} seconds of starting, pausing, or resuming recording"
    )]
    CooldownActive {
        cooldown_secs: u64,
        remaining_secs: u64,
    },

    /// Pause count has reached the limit for the media kind.
    #[error("You have reached the limit of pauses - you can choose to stop recording.")]
    PauseLimitReached { limit: u32 },

    /// Settings changed while paused and were not confirmed.
    #[error("Please confirm the recording settings before resuming")]
    NotConfirmed,
}

impl SessionError {
    /// Returns the alert severity for this error, or `None` if it is logged only.
    #[must_use]
    pub fn alert_kind(&self) -> Option<AlertKind> {
        match self {
            SessionError::Policy(_)
            | SessionError::Recording(_)
            | SessionError::Rejected { .. }
            | SessionError::Signaling(_)
            | SessionError::ParticipantNotFound(_)
            | SessionError::PermissionDenied(_) => Some(AlertKind::Danger),
            SessionError::Transport(_) | SessionError::Internal(_) => None,
        }
    }

    /// Returns a user-facing message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            SessionError::Policy(v) => v.to_string(),
            SessionError::Recording(e) => e.to_string(),
            SessionError::Rejected { reason, .. } => reason.clone(),
            SessionError::Signaling(_) => "Unable to reach the server, please retry".to_string(),
            SessionError::ParticipantNotFound(_) => "Participant not found".to_string(),
            SessionError::PermissionDenied(msg) => msg.clone(),
            SessionError::Transport(_) | SessionError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_kind_mapping() {
        assert_eq!(
            SessionError::Recording(RecordingError::NotStarted).alert_kind(),
            Some(AlertKind::Danger)
        );
        assert_eq!(
            SessionError::Rejected {
                request: "pauseRecord",
                reason: "server busy".to_string()
            }
            .alert_kind(),
            Some(AlertKind::Danger)
        );
        assert_eq!(
            SessionError::Transport(TransportError::Failed("device busy".to_string()))
                .alert_kind(),
            None
        );
        assert_eq!(SessionError::Internal("closed".to_string()).alert_kind(), None);
    }

    #[test]
    fn test_pause_limit_message() {
        let err = RecordingError::PauseLimitReached { limit: 3 };
        assert!(err.to_string().contains("reached the limit of pauses"));
    }

    #[test]
    fn test_media_not_enabled_message() {
        let err = RecordingError::MediaNotEnabled(MediaKind::Video);
        assert_eq!(
            err.to_string(),
            "You must turn on your video before you can start recording"
        );
    }

    #[test]
    fn test_client_message_hides_internal_details() {
        let err = SessionError::Internal("mailbox closed at 0x7f00".to_string());
        assert_eq!(err.client_message(), "An internal error occurred");

        let err = SessionError::Rejected {
            request: "stopRecord",
            reason: "Recording already stopped by host".to_string(),
        };
        assert_eq!(err.client_message(), "Recording already stopped by host");
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!("{}", SessionError::Signaling("timeout".to_string())),
            "Signaling error: timeout"
        );
        assert_eq!(
            format!(
                "{}",
                SessionError::Recording(RecordingError::CooldownActive {
                    cooldown_secs: 15,
                    remaining_secs: 4
                })
            ),
            "Recording error: You can only pause or resume after 15 seconds of starting, pausing, or resuming recording"
        );
    }
}
