//! Participant registry: the single source of truth for who is present.
//!
//! The signaling channel pushes full roster snapshots, never deltas, so
//! [`ParticipantRegistry::upsert_all`] replaces the roster wholesale and
//! reports which names joined or departed relative to the previous snapshot.
//! Banned and suspended entries stay in the `all` list (moderation views need
//! them) but are filtered out of the `visible` list.

use common::types::{ParticipantLevel, TrackId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// A session participant as carried on the roster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Server-assigned participant id.
    #[serde(default)]
    pub id: String,
    /// Display name, unique within a room.
    pub name: String,
    /// Audio producer id (empty when no audio track).
    #[serde(default, rename = "audioID")]
    pub audio_track_id: TrackId,
    /// Video producer id (empty when no video track).
    #[serde(default, rename = "videoID")]
    pub video_track_id: TrackId,
    /// Screen producer id, present only while sharing.
    #[serde(default, rename = "ScreenID")]
    pub screen_track_id: Option<TrackId>,
    /// Whether the participant's screen share is live.
    #[serde(default, rename = "ScreenOn")]
    pub screen_on: bool,
    /// Privilege level (ordinary=1, host=2).
    #[serde(default, rename = "islevel")]
    pub level: ParticipantLevel,
    /// Explicit host flag.
    #[serde(default)]
    pub is_host: bool,
    /// Admin flag.
    #[serde(default, rename = "isAdmin")]
    pub is_admin: bool,
    /// Muted at the protocol level.
    #[serde(default)]
    pub muted: bool,
    /// Camera on.
    #[serde(default)]
    pub video_on: bool,
    /// Banned from the room.
    #[serde(default, rename = "isBanned")]
    pub banned: bool,
    /// Suspended from the room.
    #[serde(default, rename = "isSuspended")]
    pub suspended: bool,
}

impl Participant {
    /// Host-level participants win primary-window autofill.
    #[must_use]
    pub fn is_host_level(&self) -> bool {
        self.is_host || self.level.is_host()
    }

    /// Whether this participant should appear in the visible roster.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        !self.banned && !self.suspended
    }

    /// Whether `track` is one of this participant's audio/video tracks.
    #[must_use]
    pub fn owns_track(&self, track: &TrackId) -> bool {
        !track.is_empty() && (self.audio_track_id == *track || self.video_track_id == *track)
    }

    /// Whether `track` is this participant's live screen track.
    #[must_use]
    pub fn shares_screen(&self, track: &TrackId) -> bool {
        self.screen_on && self.screen_track_id.as_ref() == Some(track)
    }

    /// All non-empty track ids owned by this participant.
    #[must_use]
    pub fn track_ids(&self) -> Vec<TrackId> {
        let mut ids = Vec::with_capacity(3);
        for id in [&self.audio_track_id, &self.video_track_id] {
            if !id.is_empty() {
                ids.push(id.clone());
            }
        }
        if let Some(screen) = &self.screen_track_id {
            if !screen.is_empty() {
                ids.push(screen.clone());
            }
        }
        ids
    }
}

/// Difference between two consecutive roster snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterDelta {
    /// Visible names present now but not before.
    pub joined: Vec<String>,
    /// Visible names present before but not now.
    pub departed: Vec<String>,
    /// The snapshot was empty.
    pub empty: bool,
}

/// Canonical, deduplicated participant list.
#[derive(Debug, Clone, Default)]
pub struct ParticipantRegistry {
    all: Vec<Participant>,
    visible: Vec<Participant>,
    co_host: Option<String>,
}

impl ParticipantRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster wholesale with a fresh snapshot.
    ///
    /// Duplicate names keep the first position and the last-seen fields.
    /// An empty snapshot is accepted; callers decide whether to act on the
    /// departures it implies (see [`RosterDelta::empty`]).
    pub fn upsert_all(&mut self, participants: Vec<Participant>) -> RosterDelta {
        let previous: HashSet<String> = self.visible.iter().map(|p| p.name.clone()).collect();

        let mut deduped: Vec<Participant> = Vec::with_capacity(participants.len());
        for participant in participants {
            if let Some(existing) = deduped.iter_mut().find(|p| p.name == participant.name) {
                *existing = participant;
            } else {
                deduped.push(participant);
            }
        }

        self.visible = deduped.iter().filter(|p| p.is_visible()).cloned().collect();
        self.all = deduped;

        let current: HashSet<&str> = self.visible.iter().map(|p| p.name.as_str()).collect();
        let joined = self
            .visible
            .iter()
            .filter(|p| !previous.contains(&p.name))
            .map(|p| p.name.clone())
            .collect();
        let mut departed: Vec<String> = previous
            .into_iter()
            .filter(|name| !current.contains(name.as_str()))
            .collect();
        departed.sort();

        let delta = RosterDelta {
            joined,
            departed,
            empty: self.all.is_empty(),
        };

        debug!(
            target: "sc.registry",
            total = self.all.len(),
            visible = self.visible.len(),
            joined = delta.joined.len(),
            departed = delta.departed.len(),
            "Roster snapshot applied"
        );

        delta
    }

    /// Visible participants (banned/suspended filtered out).
    #[must_use]
    pub fn visible(&self) -> &[Participant] {
        &self.visible
    }

    /// All participants including banned/suspended ones.
    #[must_use]
    pub fn all(&self) -> &[Participant] {
        &self.all
    }

    /// Find the visible participant owning an audio or video track.
    #[must_use]
    pub fn find_by_track(&self, track: &TrackId) -> Option<&Participant> {
        self.visible.iter().find(|p| p.owns_track(track))
    }

    /// Find a visible participant by name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&Participant> {
        self.visible.iter().find(|p| p.name == name)
    }

    /// Find the visible participant live-sharing `track` as their screen.
    #[must_use]
    pub fn find_screen_owner(&self, track: &TrackId) -> Option<&Participant> {
        self.visible.iter().find(|p| p.shares_screen(track))
    }

    /// The first visible host-level participant.
    #[must_use]
    pub fn host(&self) -> Option<&Participant> {
        self.visible.iter().find(|p| p.is_host_level())
    }

    /// Remove a participant (ban, removal, disconnect) from both lists.
    pub fn remove(&mut self, name: &str) -> Option<Participant> {
        self.visible.retain(|p| p.name != name);
        let index = self.all.iter().position(|p| p.name == name)?;
        let removed = self.all.remove(index);
        if self.co_host.as_deref() == Some(name) {
            self.co_host = None;
        }
        Some(removed)
    }

    /// Record the current co-host (empty string clears it).
    pub fn set_co_host(&mut self, name: &str) {
        self.co_host = if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        };
    }

    /// Current co-host name.
    #[must_use]
    pub fn co_host(&self) -> Option<&str> {
        self.co_host.as_deref()
    }

    /// Whether `name` may issue moderation requests (host, admin, co-host).
    #[must_use]
    pub fn can_moderate(&self, name: &str) -> bool {
        if self.co_host.as_deref() == Some(name) {
            return true;
        }
        self.find_by_name(name)
            .is_some_and(|p| p.is_host_level() || p.is_admin)
    }

    /// Number of visible participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.visible.len()
    }

    /// Whether no visible participants remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn member(name: &str, audio: &str, video: &str) -> Participant {
        Participant {
            id: format!("id-{name}"),
            name: name.to_string(),
            audio_track_id: TrackId::new(audio),
            video_track_id: TrackId::new(video),
            ..Participant::default()
        }
    }

    #[test]
    fn test_upsert_filters_banned_and_suspended() {
        let mut registry = ParticipantRegistry::new();
        let mut banned = member("Eve", "a-eve", "v-eve");
        banned.banned = true;
        let mut suspended = member("Mallory", "a-mal", "v-mal");
        suspended.suspended = true;

        registry.upsert_all(vec![member("Alice", "a1", "v1"), banned, suspended]);

        assert_eq!(registry.visible().len(), 1);
        assert_eq!(registry.all().len(), 3);
        assert!(registry.find_by_name("Eve").is_none());
        assert!(registry.find_by_track(&TrackId::new("v-mal")).is_none());
    }

    #[test]
    fn test_upsert_deduplicates_by_name() {
        let mut registry = ParticipantRegistry::new();
        let mut updated = member("Alice", "a1", "v2");
        updated.video_on = true;

        registry.upsert_all(vec![member("Alice", "a1", "v1"), member("Bob", "", ""), updated]);

        assert_eq!(registry.visible().len(), 2);
        let alice = registry.find_by_name("Alice").unwrap();
        assert_eq!(alice.video_track_id, TrackId::new("v2"));
        assert!(alice.video_on);
        assert_eq!(registry.visible().first().unwrap().name, "Alice");
    }

    #[test]
    fn test_delta_reports_joins_and_departures() {
        let mut registry = ParticipantRegistry::new();
        let delta = registry.upsert_all(vec![member("Alice", "", ""), member("Bob", "", "")]);
        assert_eq!(delta.joined, vec!["Alice".to_string(), "Bob".to_string()]);
        assert!(delta.departed.is_empty());

        let delta = registry.upsert_all(vec![member("Bob", "", ""), member("Carol", "", "")]);
        assert_eq!(delta.joined, vec!["Carol".to_string()]);
        assert_eq!(delta.departed, vec!["Alice".to_string()]);
        assert!(!delta.empty);
    }

    #[test]
    fn test_empty_snapshot_is_accepted() {
        let mut registry = ParticipantRegistry::new();
        registry.upsert_all(vec![member("Alice", "", "")]);
        let delta = registry.upsert_all(Vec::new());
        assert!(delta.empty);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_empty_track_ids_never_match() {
        let mut registry = ParticipantRegistry::new();
        registry.upsert_all(vec![member("Alice", "", "")]);
        assert!(registry.find_by_track(&TrackId::new("")).is_none());
    }

    #[test]
    fn test_screen_owner_requires_screen_on() {
        let mut registry = ParticipantRegistry::new();
        let mut sharer = member("Alice", "a1", "v1");
        sharer.screen_track_id = Some(TrackId::new("s1"));
        registry.upsert_all(vec![sharer.clone()]);
        assert!(registry.find_screen_owner(&TrackId::new("s1")).is_none());

        sharer.screen_on = true;
        registry.upsert_all(vec![sharer]);
        assert_eq!(
            registry.find_screen_owner(&TrackId::new("s1")).unwrap().name,
            "Alice"
        );
    }

    #[test]
    fn test_moderation_rights() {
        let mut registry = ParticipantRegistry::new();
        let mut host = member("Host", "", "");
        host.level = ParticipantLevel::Host;
        registry.upsert_all(vec![host, member("Bob", "", ""), member("Carol", "", "")]);
        registry.set_co_host("Carol");

        assert!(registry.can_moderate("Host"));
        assert!(registry.can_moderate("Carol"));
        assert!(!registry.can_moderate("Bob"));

        registry.remove("Carol");
        assert!(registry.co_host().is_none());
        assert!(!registry.can_moderate("Carol"));
    }

    #[test]
    fn test_roster_wire_format() {
        let json = r#"{
            "id": "p1",
            "name": "Host",
            "audioID": "a-host",
            "videoID": "v-host",
            "ScreenOn": false,
            "islevel": 2,
            "isBanned": false
        }"#;
        let participant: Participant = serde_json::from_str(json).unwrap();
        assert!(participant.is_host_level());
        assert_eq!(participant.video_track_id, TrackId::new("v-host"));
        assert!(participant.screen_track_id.is_none());
    }
}
