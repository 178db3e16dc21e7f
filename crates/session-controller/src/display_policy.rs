//! Display policy validation against recording and breakout locks.
//!
//! While a recording is started (not paused) its display parameters are
//! locked. A proposed policy that conflicts with the lock is rejected with a
//! [`PolicyViolation`] naming the reason, and the caller reports the snapped
//! value upward. A running breakout session forces `displayType = all` and
//! takes precedence over the recording lock.

use crate::observability::metrics;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Which participants are shown in the grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayType {
    /// Only participants with video on.
    #[default]
    Video,
    /// Participants with any media on.
    Media,
    /// Everyone.
    All,
}

impl DisplayType {
    /// Wire and label representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DisplayType::Video => "video",
            DisplayType::Media => "media",
            DisplayType::All => "all",
        }
    }

    /// Whether `proposed` is permitted under a recording locked to `self`.
    #[must_use]
    pub const fn permits(&self, proposed: DisplayType) -> bool {
        matches!(
            (self, proposed),
            (DisplayType::Video, DisplayType::Video)
                | (DisplayType::Media, DisplayType::Media | DisplayType::All)
                | (DisplayType::All, DisplayType::All)
        )
    }
}

impl fmt::Display for DisplayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recording orientation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Landscape,
    Portrait,
    /// Either orientation.
    All,
}

/// User-selected display policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPolicy {
    #[serde(default)]
    pub display_type: DisplayType,
    #[serde(default)]
    pub video_optimized: bool,
    #[serde(default)]
    pub force_full_display: bool,
    #[serde(default)]
    pub orientation: Orientation,
}

/// Display parameters captured when a recording starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingLock {
    pub display_type: DisplayType,
    pub orientation: Orientation,
    pub video_optimized: bool,
}

impl RecordingLock {
    /// Capture the lock from the policy in force at start.
    #[must_use]
    pub fn from_policy(policy: &DisplayPolicy) -> Self {
        Self {
            display_type: policy.display_type,
            orientation: policy.orientation,
            video_optimized: policy.video_optimized,
        }
    }
}

/// Why a policy change was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PolicyReason {
    /// Display type or optimization conflicts with the recording lock.
    RecordingDisplayLock,
    /// Orientation conflicts with the recording lock.
    RecordingOrientationLock,
    /// A breakout session forces `all`.
    BreakoutRoomLock,
}

impl PolicyReason {
    /// Human-readable reason, also used as a metric label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            PolicyReason::RecordingDisplayLock => "recording display lock",
            PolicyReason::RecordingOrientationLock => "recording orientation lock",
            PolicyReason::BreakoutRoomLock => "breakout room lock",
        }
    }
}

impl fmt::Display for PolicyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected policy change and the value the policy snaps back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Display settings rejected: {reason}")]
pub struct PolicyViolation {
    pub reason: PolicyReason,
    pub requested: DisplayPolicy,
    pub snapped: DisplayPolicy,
}

/// Stateless validator for display policy changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayPolicyGuard;

impl DisplayPolicyGuard {
    /// Validate `proposed` against the active locks.
    ///
    /// `lock` must only be `Some` while a recording is started and unpaused.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyViolation`] with the snapped policy when the proposal
    /// conflicts with the breakout override or the recording lock.
    pub fn validate(
        current: &DisplayPolicy,
        proposed: DisplayPolicy,
        lock: Option<&RecordingLock>,
        breakout_active: bool,
    ) -> Result<DisplayPolicy, PolicyViolation> {
        if breakout_active && proposed.display_type != DisplayType::All {
            let snapped = DisplayPolicy {
                display_type: DisplayType::All,
                ..*current
            };
            return Err(Self::reject(PolicyReason::BreakoutRoomLock, proposed, snapped));
        }

        let Some(lock) = lock else {
            return Ok(proposed);
        };

        let snapped = DisplayPolicy {
            display_type: if breakout_active {
                DisplayType::All
            } else {
                lock.display_type
            },
            video_optimized: lock.video_optimized,
            orientation: lock.orientation,
            force_full_display: current.force_full_display,
        };

        // Breakout already forced `all`; the recording's type lock yields to it.
        let type_ok = breakout_active || lock.display_type.permits(proposed.display_type);
        let optimized_ok = !lock.video_optimized || proposed.video_optimized;
        if !type_ok || !optimized_ok {
            return Err(Self::reject(
                PolicyReason::RecordingDisplayLock,
                proposed,
                snapped,
            ));
        }

        if lock.orientation != Orientation::All && proposed.orientation != lock.orientation {
            return Err(Self::reject(
                PolicyReason::RecordingOrientationLock,
                proposed,
                snapped,
            ));
        }

        Ok(proposed)
    }

    /// The policy to apply when a breakout session ends: the user's last
    /// requested policy if it is legal now, otherwise `fallback`.
    #[must_use]
    pub fn restore_after_breakout(
        requested: &DisplayPolicy,
        fallback: &DisplayPolicy,
        lock: Option<&RecordingLock>,
    ) -> DisplayPolicy {
        Self::validate(fallback, *requested, lock, false).unwrap_or(*fallback)
    }

    fn reject(
        reason: PolicyReason,
        requested: DisplayPolicy,
        snapped: DisplayPolicy,
    ) -> PolicyViolation {
        warn!(
            target: "sc.policy",
            reason = reason.as_str(),
            requested = requested.display_type.as_str(),
            snapped = snapped.display_type.as_str(),
            "Display policy change rejected"
        );
        metrics::record_policy_rejection(reason.as_str());
        PolicyViolation {
            reason,
            requested,
            snapped,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn policy(display_type: DisplayType) -> DisplayPolicy {
        DisplayPolicy {
            display_type,
            ..DisplayPolicy::default()
        }
    }

    fn lock(display_type: DisplayType) -> RecordingLock {
        RecordingLock {
            display_type,
            orientation: Orientation::Landscape,
            video_optimized: false,
        }
    }

    #[test]
    fn test_video_lock_rejects_all() {
        let current = policy(DisplayType::Video);
        let err = DisplayPolicyGuard::validate(
            &current,
            policy(DisplayType::All),
            Some(&lock(DisplayType::Video)),
            false,
        )
        .unwrap_err();

        assert_eq!(err.reason, PolicyReason::RecordingDisplayLock);
        assert_eq!(err.snapped.display_type, DisplayType::Video);
        assert_eq!(err.reason.to_string(), "recording display lock");
    }

    #[test]
    fn test_lock_permission_table() {
        let cases = [
            (DisplayType::Video, DisplayType::Video, true),
            (DisplayType::Video, DisplayType::Media, false),
            (DisplayType::Media, DisplayType::Media, true),
            (DisplayType::Media, DisplayType::All, true),
            (DisplayType::Media, DisplayType::Video, false),
            (DisplayType::All, DisplayType::All, true),
            (DisplayType::All, DisplayType::Media, false),
        ];
        for (locked, proposed, allowed) in cases {
            let result = DisplayPolicyGuard::validate(
                &policy(locked),
                policy(proposed),
                Some(&lock(locked)),
                false,
            );
            assert_eq!(result.is_ok(), allowed, "{locked} lock, {proposed} proposed");
        }
    }

    #[test]
    fn test_optimized_lock_requires_optimized_video() {
        let mut locked = lock(DisplayType::Video);
        locked.video_optimized = true;
        let current = DisplayPolicy {
            video_optimized: true,
            ..policy(DisplayType::Video)
        };

        let err =
            DisplayPolicyGuard::validate(&current, policy(DisplayType::Video), Some(&locked), false)
                .unwrap_err();
        assert_eq!(err.reason, PolicyReason::RecordingDisplayLock);
        assert!(err.snapped.video_optimized);

        assert!(DisplayPolicyGuard::validate(&current, current, Some(&locked), false).is_ok());
    }

    #[test]
    fn test_orientation_lock() {
        let current = policy(DisplayType::Video);
        let proposed = DisplayPolicy {
            orientation: Orientation::Portrait,
            ..current
        };
        let err = DisplayPolicyGuard::validate(
            &current,
            proposed,
            Some(&lock(DisplayType::Video)),
            false,
        )
        .unwrap_err();
        assert_eq!(err.reason, PolicyReason::RecordingOrientationLock);
    }

    #[test]
    fn test_breakout_overrides_recording_lock() {
        let current = policy(DisplayType::Video);

        let err = DisplayPolicyGuard::validate(&current, policy(DisplayType::Video), None, true)
            .unwrap_err();
        assert_eq!(err.reason, PolicyReason::BreakoutRoomLock);
        assert_eq!(err.snapped.display_type, DisplayType::All);

        // `all` is legal during breakout even under a video-locked recording.
        let accepted = DisplayPolicyGuard::validate(
            &current,
            policy(DisplayType::All),
            Some(&lock(DisplayType::Video)),
            true,
        )
        .unwrap();
        assert_eq!(accepted.display_type, DisplayType::All);
    }

    #[test]
    fn test_no_lock_accepts_anything() {
        let current = policy(DisplayType::Video);
        let accepted =
            DisplayPolicyGuard::validate(&current, policy(DisplayType::Media), None, false)
                .unwrap();
        assert_eq!(accepted.display_type, DisplayType::Media);
    }

    #[test]
    fn test_restore_after_breakout() {
        let requested = policy(DisplayType::Media);
        let fallback = policy(DisplayType::Video);

        assert_eq!(
            DisplayPolicyGuard::restore_after_breakout(&requested, &fallback, None),
            requested
        );
        assert_eq!(
            DisplayPolicyGuard::restore_after_breakout(
                &requested,
                &fallback,
                Some(&lock(DisplayType::Video))
            ),
            fallback
        );
    }
}
