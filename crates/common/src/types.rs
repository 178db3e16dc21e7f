//! Common data types for session controller components.

use crate::error::CommonError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a media track (a producer id on the SFU).
///
/// The local user's own preview uses the reserved [`TrackId::SELF_SENTINEL`]
/// value, which never collides with a server-issued producer id.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TrackId(pub String);

impl TrackId {
    /// Reserved identifier denoting the local user's own preview.
    pub const SELF_SENTINEL: &'static str = "self";

    /// Create a track id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The self sentinel track id.
    #[must_use]
    pub fn self_sentinel() -> Self {
        Self(Self::SELF_SENTINEL.to_string())
    }

    /// Whether this id is the self sentinel.
    #[must_use]
    pub fn is_self(&self) -> bool {
        self.0 == Self::SELF_SENTINEL
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Empty ids are what the roster carries for "no track yet".
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TrackId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Kind of a media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio track.
    Audio,
    /// Camera or screen video track.
    Video,
}

impl MediaKind {
    /// Returns the kind as a string for metric labels and wire payloads.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl FromStr for MediaKind {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            other => Err(CommonError::UnknownMediaKind(other.to_string())),
        }
    }
}

/// Participant privilege level as carried on the roster (ordinary=1, host=2).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum ParticipantLevel {
    /// Ordinary participant.
    #[default]
    Ordinary,
    /// Host-level participant.
    Host,
}

impl ParticipantLevel {
    /// Whether this level grants host priority.
    #[must_use]
    pub const fn is_host(&self) -> bool {
        matches!(self, ParticipantLevel::Host)
    }
}

impl TryFrom<u8> for ParticipantLevel {
    type Error = CommonError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ParticipantLevel::Ordinary),
            2 => Ok(ParticipantLevel::Host),
            other => Err(CommonError::UnknownLevel(other)),
        }
    }
}

impl From<ParticipantLevel> for u8 {
    fn from(level: ParticipantLevel) -> Self {
        match level {
            ParticipantLevel::Ordinary => 1,
            ParticipantLevel::Host => 2,
        }
    }
}
