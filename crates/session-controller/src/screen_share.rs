//! Screen-share coordination: at most one active screen producer per session.
//!
//! ```text
//! Idle ──announce (owner unknown)──▶ Announced ──roster confirms owner──▶ Active
//!   ▲                                   │                                  │
//!   └──────────── close ────────────────┴────────────── close ─────────────┘
//! ```
//!
//! A screen-producer id can arrive before the roster lists the sharing
//! participant with `ScreenOn=true`. The coordinator keeps it as the deferred
//! track and re-checks on every roster upsert. Once active, no other track can
//! take the screen slot until an explicit close clears it.

use crate::registry::ParticipantRegistry;
use common::types::TrackId;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Internal coordinator phase.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ScreenPhase {
    Idle,
    Announced {
        deferred: TrackId,
    },
    Active {
        track: TrackId,
        owner: String,
        locked_to_host: bool,
    },
}

/// Outcome of a screen-producer announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnounceOutcome {
    /// Owner confirmed; the track now holds the screen slot.
    Activated { track: TrackId, owner: String },
    /// Owner not yet confirmed; kept as the deferred track.
    Deferred { track: TrackId },
    /// Same track re-announced while already active.
    AlreadyActive,
    /// Another track holds the screen slot.
    Rejected { active: TrackId },
}

/// Outcome of a screen-producer close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Screen slot cleared; the primary window should be reset.
    Cleared { owner: String },
    /// Screen slot cleared, but a whiteboard holds the primary window, so the
    /// "no active screen" reset must not run.
    Suppressed { owner: String },
    /// A pending announcement was dropped.
    DeferredDropped,
    /// The track was not the screen track.
    NotScreen,
}

/// Serializable view of the screen-share state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenShareState {
    /// Track currently holding the screen slot.
    pub active_screen_track_id: Option<TrackId>,
    /// Whether a screen share is live.
    pub started: bool,
    /// Announced track waiting for roster confirmation.
    pub deferred_track_id: Option<TrackId>,
    /// The active share belongs to a host-level participant.
    pub locked_to_host: bool,
    /// Owner of the active share.
    pub owner: Option<String>,
}

/// Enforces the single-active-screen invariant.
#[derive(Debug, Clone)]
pub struct ScreenShareCoordinator {
    phase: ScreenPhase,
}

impl Default for ScreenShareCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenShareCoordinator {
    /// Create an idle coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: ScreenPhase::Idle,
        }
    }

    /// Handle a screen-producer announcement.
    ///
    /// `local_share` is the local user's own screen track, if sharing; a match
    /// activates immediately without waiting for the roster.
    pub fn announce(
        &mut self,
        track: TrackId,
        registry: &ParticipantRegistry,
        local_share: Option<(&TrackId, &str)>,
    ) -> AnnounceOutcome {
        if let ScreenPhase::Active { track: active, .. } = &self.phase {
            if *active == track {
                return AnnounceOutcome::AlreadyActive;
            }
            warn!(
                target: "sc.screen",
                active = %active,
                rejected = %track,
                "Screen announcement rejected, another screen is active"
            );
            return AnnounceOutcome::Rejected {
                active: active.clone(),
            };
        }

        if let Some((local_track, local_name)) = local_share {
            if *local_track == track {
                return self.activate(track, local_name.to_string(), false);
            }
        }

        if let Some(owner) = registry.find_screen_owner(&track) {
            let name = owner.name.clone();
            let host = owner.is_host_level();
            return self.activate(track, name, host);
        }

        if let ScreenPhase::Announced { deferred } = &self.phase {
            if *deferred != track {
                debug!(
                    target: "sc.screen",
                    replaced = %deferred,
                    deferred = %track,
                    "Replacing deferred screen announcement"
                );
            }
        }

        debug!(target: "sc.screen", deferred = %track, "Screen owner not confirmed, deferring");
        self.phase = ScreenPhase::Announced {
            deferred: track.clone(),
        };
        AnnounceOutcome::Deferred { track }
    }

    /// Re-check a deferred announcement after a roster upsert.
    ///
    /// Returns the activation when the roster now confirms the owner.
    pub fn on_roster(&mut self, registry: &ParticipantRegistry) -> Option<AnnounceOutcome> {
        let ScreenPhase::Announced { deferred } = &self.phase else {
            return None;
        };
        let owner = registry.find_screen_owner(deferred)?;
        let track = deferred.clone();
        let name = owner.name.clone();
        let host = owner.is_host_level();
        Some(self.activate(track, name, host))
    }

    /// Handle a producer close; only the screen or deferred track has effect.
    pub fn close(&mut self, track: &TrackId, whiteboard_active: bool) -> CloseOutcome {
        match &self.phase {
            ScreenPhase::Active {
                track: active,
                owner,
                ..
            } if active == track => {
                let owner = owner.clone();
                self.phase = ScreenPhase::Idle;
                if whiteboard_active {
                    debug!(
                        target: "sc.screen",
                        track = %track,
                        "Screen closed under active whiteboard, suppressing reset"
                    );
                    CloseOutcome::Suppressed { owner }
                } else {
                    info!(target: "sc.screen", track = %track, "Screen share ended");
                    CloseOutcome::Cleared { owner }
                }
            }
            ScreenPhase::Announced { deferred } if deferred == track => {
                self.phase = ScreenPhase::Idle;
                CloseOutcome::DeferredDropped
            }
            _ => CloseOutcome::NotScreen,
        }
    }

    /// The active screen track, if any.
    #[must_use]
    pub fn active_track(&self) -> Option<&TrackId> {
        match &self.phase {
            ScreenPhase::Active { track, .. } => Some(track),
            _ => None,
        }
    }

    /// Whether `track` currently holds the screen slot.
    #[must_use]
    pub fn is_locked(&self, track: &TrackId) -> bool {
        self.active_track() == Some(track)
    }

    /// Serializable view of the current state.
    #[must_use]
    pub fn state(&self) -> ScreenShareState {
        match &self.phase {
            ScreenPhase::Idle => ScreenShareState::default(),
            ScreenPhase::Announced { deferred } => ScreenShareState {
                deferred_track_id: Some(deferred.clone()),
                ..ScreenShareState::default()
            },
            ScreenPhase::Active {
                track,
                owner,
                locked_to_host,
            } => ScreenShareState {
                active_screen_track_id: Some(track.clone()),
                started: true,
                deferred_track_id: None,
                locked_to_host: *locked_to_host,
                owner: Some(owner.clone()),
            },
        }
    }

    fn activate(&mut self, track: TrackId, owner: String, locked_to_host: bool) -> AnnounceOutcome {
        info!(
            target: "sc.screen",
            track = %track,
            owner = %owner,
            locked_to_host,
            "Screen share active"
        );
        self.phase = ScreenPhase::Active {
            track: track.clone(),
            owner: owner.clone(),
            locked_to_host,
        };
        AnnounceOutcome::Activated { track, owner }
    }
}
