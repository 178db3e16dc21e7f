//! Stream classification: which bucket a resumed track belongs to.
//!
//! Every resumed track is resolved into a [`ClassificationInput`] against the
//! current roster, then bucketed by [`classify`]:
//!
//! 1. Self sentinel: self-preview when local video is on, otherwise an
//!    initials-only card in the secondary grid.
//! 2. Unresolved owner: placeholder card keyed by a pseudo name. Unresolved
//!    tracks still render; dropping them would desynchronize the visible count
//!    from the authoritative roster.
//! 3. Video on the locked screen track: exclusive primary occupancy.
//! 4. Owner is the primary occupant: joins the primary window (audio never
//!    duplicates into the audio strip).
//! 5. Host-level owner while the primary window is empty: fills it.
//! 6. Otherwise audio goes to the audio-only strip and video to the grid.
//!
//! Classification is total: it never fails and never panics.

use crate::registry::{Participant, ParticipantRegistry};
use common::types::{MediaKind, TrackId};
use serde::Serialize;
use tracing::debug;

/// Where a classified stream is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Bucket {
    /// Local user's own preview.
    SelfView,
    /// The single large primary window.
    Primary,
    /// The paginated secondary grid.
    SecondaryGrid,
    /// The audio-only strip.
    AudioOnly,
}

impl Bucket {
    /// Returns the bucket as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Bucket::SelfView => "self",
            Bucket::Primary => "primary",
            Bucket::SecondaryGrid => "secondary_grid",
            Bucket::AudioOnly => "audio_only",
        }
    }

    /// Buckets that occupy a grid slot.
    #[must_use]
    pub const fn is_grid(&self) -> bool {
        matches!(self, Bucket::SecondaryGrid | Bucket::AudioOnly)
    }
}

/// Card used to render a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CardKind {
    /// Live video.
    Video,
    /// Audio with waveform.
    Audio,
    /// Placeholder with initials (no live media or unresolved owner).
    Mini,
}

/// Who a stream belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "name", rename_all = "camelCase")]
pub enum StreamOwner {
    /// The local user.
    Local(String),
    /// A roster participant.
    Participant(String),
    /// An owner the roster could not resolve.
    Pseudo(String),
}

impl StreamOwner {
    /// The name shown on the card.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            StreamOwner::Local(name) | StreamOwner::Participant(name) | StreamOwner::Pseudo(name) => {
                name
            }
        }
    }
}

/// A track assigned to exactly one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedStream {
    pub track_id: TrackId,
    pub owner: StreamOwner,
    pub kind: MediaKind,
    pub bucket: Bucket,
    pub card: CardKind,
}

/// Occupant of the primary window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PrimaryWindow {
    /// Nothing in the primary window.
    #[default]
    Empty,
    /// A participant's media.
    Participant { name: String },
    /// A screen share, exclusively.
    Screen {
        track: TrackId,
        owner: Option<String>,
    },
}

impl PrimaryWindow {
    /// Name of the participant occupying the window, if a participant does.
    #[must_use]
    pub fn occupant(&self) -> Option<&str> {
        match self {
            PrimaryWindow::Participant { name } => Some(name),
            _ => None,
        }
    }

    /// Whether the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, PrimaryWindow::Empty)
    }
}

/// Closed set of classification inputs; every case is handled explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassificationInput {
    /// The self sentinel track.
    SelfTrack { kind: MediaKind },
    /// A track whose owner the roster resolved.
    OwnedTrack {
        track: TrackId,
        kind: MediaKind,
        owner: Participant,
    },
    /// A track with no roster owner.
    UnresolvedTrack {
        track: TrackId,
        kind: MediaKind,
        pseudo_name: String,
    },
}

impl ClassificationInput {
    /// Resolve a resumed track against the roster.
    ///
    /// `name_hint` is the owner name carried by the signaling event. It
    /// resolves the owner when no roster entry lists the track yet, and
    /// becomes the pseudo name when the roster has no such participant.
    #[must_use]
    pub fn resolve(
        track: TrackId,
        kind: MediaKind,
        name_hint: Option<&str>,
        registry: &ParticipantRegistry,
    ) -> Self {
        if track.is_self() {
            return ClassificationInput::SelfTrack { kind };
        }

        let owner = registry
            .find_by_track(&track)
            .or_else(|| registry.find_screen_owner(&track))
            .or_else(|| name_hint.and_then(|name| registry.find_by_name(name)));
        if let Some(owner) = owner {
            return ClassificationInput::OwnedTrack {
                track,
                kind,
                owner: owner.clone(),
            };
        }

        let pseudo_name = match name_hint {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => track.to_string(),
        };
        debug!(
            target: "sc.classifier",
            track = %track,
            pseudo_name = %pseudo_name,
            "Track owner not in roster, using placeholder"
        );
        ClassificationInput::UnresolvedTrack {
            track,
            kind,
            pseudo_name,
        }
    }
}

/// Read-only session facts the classifier consults.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierContext<'a> {
    /// Local participant name.
    pub local_name: &'a str,
    /// Local camera is on.
    pub local_video_on: bool,
    /// Current primary-window occupant.
    pub primary: &'a PrimaryWindow,
    /// Track currently holding the screen slot.
    pub locked_screen: Option<&'a TrackId>,
}

/// Side effect on the primary window requested by a classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryEffect {
    /// No change.
    None,
    /// A host-level owner fills the empty primary window.
    Fill { name: String },
    /// The primary occupant's media changed; rebuild the primary window.
    Repopulate { name: String },
    /// A screen share takes the primary window exclusively.
    ScreenExclusive { track: TrackId, owner: String },
}

/// Result of classifying one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub stream: ClassifiedStream,
    pub effect: PrimaryEffect,
}

/// Bucket a resolved track.
#[must_use]
pub fn classify(input: ClassificationInput, ctx: &ClassifierContext<'_>) -> Classification {
    match input {
        ClassificationInput::SelfTrack { kind } => {
            let (bucket, card) = match kind {
                MediaKind::Video if ctx.local_video_on => (Bucket::SelfView, CardKind::Video),
                MediaKind::Video => (Bucket::SecondaryGrid, CardKind::Mini),
                MediaKind::Audio => (Bucket::SelfView, CardKind::Audio),
            };
            Classification {
                stream: ClassifiedStream {
                    track_id: TrackId::self_sentinel(),
                    owner: StreamOwner::Local(ctx.local_name.to_string()),
                    kind,
                    bucket,
                    card,
                },
                effect: PrimaryEffect::None,
            }
        }

        ClassificationInput::UnresolvedTrack {
            track,
            kind,
            pseudo_name,
        } => {
            let bucket = match kind {
                MediaKind::Audio => Bucket::AudioOnly,
                MediaKind::Video => Bucket::SecondaryGrid,
            };
            Classification {
                stream: ClassifiedStream {
                    track_id: track,
                    owner: StreamOwner::Pseudo(pseudo_name),
                    kind,
                    bucket,
                    card: CardKind::Mini,
                },
                effect: PrimaryEffect::None,
            }
        }

        ClassificationInput::OwnedTrack { track, kind, owner } => {
            classify_owned(track, kind, &owner, ctx)
        }
    }
}

fn classify_owned(
    track: TrackId,
    kind: MediaKind,
    owner: &Participant,
    ctx: &ClassifierContext<'_>,
) -> Classification {
    let name = owner.name.clone();
    let card = match kind {
        MediaKind::Audio => CardKind::Audio,
        MediaKind::Video => CardKind::Video,
    };
    let stream = |bucket: Bucket, card: CardKind| ClassifiedStream {
        track_id: track.clone(),
        owner: StreamOwner::Participant(name.clone()),
        kind,
        bucket,
        card,
    };

    if kind == MediaKind::Video && ctx.locked_screen == Some(&track) {
        return Classification {
            stream: stream(Bucket::Primary, CardKind::Video),
            effect: PrimaryEffect::ScreenExclusive {
                track: track.clone(),
                owner: name.clone(),
            },
        };
    }

    if ctx.primary.occupant() == Some(name.as_str()) {
        return Classification {
            stream: stream(Bucket::Primary, card),
            effect: PrimaryEffect::Repopulate { name: name.clone() },
        };
    }

    if owner.is_host_level() && ctx.primary.is_empty() {
        return Classification {
            stream: stream(Bucket::Primary, card),
            effect: PrimaryEffect::Fill { name: name.clone() },
        };
    }

    let bucket = match kind {
        MediaKind::Audio => Bucket::AudioOnly,
        MediaKind::Video => Bucket::SecondaryGrid,
    };
    Classification {
        stream: stream(bucket, card),
        effect: PrimaryEffect::None,
    }
}

/// Ordered set of classified streams, keyed by track id.
///
/// A track id appears at most once, so a stream is in at most one bucket.
/// Insertion order is preserved; re-classifying a track keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSet {
    streams: Vec<ClassifiedStream>,
}

impl StreamSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or re-bucket a stream. Returns the previous entry, if any.
    pub fn upsert(&mut self, stream: ClassifiedStream) -> Option<ClassifiedStream> {
        if let Some(existing) = self
            .streams
            .iter_mut()
            .find(|s| s.track_id == stream.track_id)
        {
            return Some(std::mem::replace(existing, stream));
        }
        self.streams.push(stream);
        None
    }

    /// Remove a stream by track id.
    pub fn remove(&mut self, track: &TrackId) -> Option<ClassifiedStream> {
        let index = self.streams.iter().position(|s| s.track_id == *track)?;
        Some(self.streams.remove(index))
    }

    /// Remove every stream of `name`, placeholders included.
    pub fn remove_owner(&mut self, name: &str) -> Vec<ClassifiedStream> {
        let (removed, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.streams).into_iter().partition(|s| {
                matches!(&s.owner, StreamOwner::Participant(n) | StreamOwner::Pseudo(n) if n == name)
            });
        self.streams = kept;
        removed
    }

    /// Look up a stream.
    #[must_use]
    pub fn get(&self, track: &TrackId) -> Option<&ClassifiedStream> {
        self.streams.iter().find(|s| s.track_id == *track)
    }

    /// Placeholder streams whose pseudo name is one of `names`.
    pub fn placeholders_for<'a>(
        &'a self,
        names: &'a [String],
    ) -> impl Iterator<Item = &'a ClassifiedStream> + 'a {
        self.streams
            .iter()
            .filter(|s| matches!(&s.owner, StreamOwner::Pseudo(n) if names.contains(n)))
    }

    /// Change the card of a stream (e.g. video paused -> mini).
    pub fn set_card(&mut self, track: &TrackId, card: CardKind) -> bool {
        match self.streams.iter_mut().find(|s| s.track_id == *track) {
            Some(stream) => {
                stream.card = card;
                true
            }
            None => false,
        }
    }

    /// Move every stream of participant `name` into the primary bucket.
    pub fn promote_owner(&mut self, name: &str) -> usize {
        let mut moved = 0;
        for stream in &mut self.streams {
            if matches!(&stream.owner, StreamOwner::Participant(n) if n == name)
                && stream.bucket != Bucket::Primary
            {
                stream.bucket = Bucket::Primary;
                moved += 1;
            }
        }
        moved
    }

    /// Move every primary stream except `keep` back to its default bucket.
    pub fn demote_primary(&mut self, keep: Option<&TrackId>) {
        for stream in &mut self.streams {
            if stream.bucket == Bucket::Primary && Some(&stream.track_id) != keep {
                stream.bucket = match stream.kind {
                    MediaKind::Audio => Bucket::AudioOnly,
                    MediaKind::Video => Bucket::SecondaryGrid,
                };
            }
        }
    }

    /// Streams in the primary bucket.
    pub fn primary(&self) -> impl Iterator<Item = &ClassifiedStream> {
        self.streams.iter().filter(|s| s.bucket == Bucket::Primary)
    }

    /// Streams that occupy grid slots, in insertion order.
    pub fn grid_members(&self) -> impl Iterator<Item = &ClassifiedStream> {
        self.streams.iter().filter(|s| s.bucket.is_grid())
    }

    /// The self-preview stream, if any.
    #[must_use]
    pub fn self_view(&self) -> Option<&ClassifiedStream> {
        self.streams
            .iter()
            .find(|s| s.bucket == Bucket::SelfView && s.kind == MediaKind::Video)
    }

    /// All streams in insertion order.
    #[must_use]
    pub fn as_slice(&self) -> &[ClassifiedStream] {
        &self.streams
    }

    /// Number of classified streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Whether no streams are classified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Drop everything (room teardown).
    pub fn clear(&mut self) {
        self.streams.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::types::ParticipantLevel;

    fn roster() -> ParticipantRegistry {
        let mut registry = ParticipantRegistry::new();
        registry.upsert_all(vec![
            Participant {
                name: "Host".to_string(),
                audio_track_id: TrackId::new("a-host"),
                video_track_id: TrackId::new("v-host"),
                level: ParticipantLevel::Host,
                ..Participant::default()
            },
            Participant {
                name: "Bob".to_string(),
                audio_track_id: TrackId::new("a-bob"),
                video_track_id: TrackId::new("v-bob"),
                ..Participant::default()
            },
        ]);
        registry
    }

    fn ctx<'a>(primary: &'a PrimaryWindow, screen: Option<&'a TrackId>) -> ClassifierContext<'a> {
        ClassifierContext {
            local_name: "Me",
            local_video_on: false,
            primary,
            locked_screen: screen,
        }
    }

    #[test]
    fn test_host_video_fills_empty_primary() {
        let registry = roster();
        let primary = PrimaryWindow::Empty;
        let input =
            ClassificationInput::resolve(TrackId::new("v-host"), MediaKind::Video, None, &registry);

        let result = classify(input, &ctx(&primary, None));

        assert_eq!(result.stream.bucket, Bucket::Primary);
        assert_eq!(
            result.effect,
            PrimaryEffect::Fill {
                name: "Host".to_string()
            }
        );
    }

    #[test]
    fn test_ordinary_video_goes_to_grid() {
        let registry = roster();
        let primary = PrimaryWindow::Empty;
        let input =
            ClassificationInput::resolve(TrackId::new("v-bob"), MediaKind::Video, None, &registry);

        let result = classify(input, &ctx(&primary, None));

        assert_eq!(result.stream.bucket, Bucket::SecondaryGrid);
        assert_eq!(result.stream.card, CardKind::Video);
        assert_eq!(result.effect, PrimaryEffect::None);
    }

    #[test]
    fn test_primary_occupant_audio_never_enters_strip() {
        let registry = roster();
        let primary = PrimaryWindow::Participant {
            name: "Bob".to_string(),
        };
        let input =
            ClassificationInput::resolve(TrackId::new("a-bob"), MediaKind::Audio, None, &registry);

        let result = classify(input, &ctx(&primary, None));

        assert_eq!(result.stream.bucket, Bucket::Primary);
        assert_eq!(
            result.effect,
            PrimaryEffect::Repopulate {
                name: "Bob".to_string()
            }
        );
    }

    #[test]
    fn test_audio_goes_to_audio_strip_when_primary_taken() {
        let registry = roster();
        let primary = PrimaryWindow::Participant {
            name: "Bob".to_string(),
        };
        let input =
            ClassificationInput::resolve(TrackId::new("a-host"), MediaKind::Audio, None, &registry);

        let result = classify(input, &ctx(&primary, None));
        assert_eq!(result.stream.bucket, Bucket::AudioOnly);
    }

    #[test]
    fn test_locked_screen_is_exclusive_primary() {
        let mut registry = roster();
        let mut participants = registry.visible().to_vec();
        if let Some(bob) = participants.iter_mut().find(|p| p.name == "Bob") {
            bob.screen_track_id = Some(TrackId::new("s-bob"));
            bob.screen_on = true;
        }
        registry.upsert_all(participants);

        let screen = TrackId::new("s-bob");
        let primary = PrimaryWindow::Participant {
            name: "Host".to_string(),
        };
        let input = ClassificationInput::resolve(screen.clone(), MediaKind::Video, None, &registry);

        let result = classify(input, &ctx(&primary, Some(&screen)));
        assert_eq!(result.stream.bucket, Bucket::Primary);
        assert!(matches!(result.effect, PrimaryEffect::ScreenExclusive { .. }));
    }

    #[test]
    fn test_unresolved_track_gets_placeholder() {
        let registry = roster();
        let primary = PrimaryWindow::Empty;
        let input = ClassificationInput::resolve(
            TrackId::new("ghost"),
            MediaKind::Audio,
            Some("Zed"),
            &registry,
        );
        assert!(matches!(input, ClassificationInput::UnresolvedTrack { .. }));

        let result = classify(input, &ctx(&primary, None));
        assert_eq!(result.stream.bucket, Bucket::AudioOnly);
        assert_eq!(result.stream.card, CardKind::Mini);
        assert_eq!(result.stream.owner, StreamOwner::Pseudo("Zed".to_string()));
    }

    #[test]
    fn test_name_hint_resolves_owner_without_track() {
        let registry = roster();
        let primary = PrimaryWindow::Empty;
        let input = ClassificationInput::resolve(
            TrackId::new("v-bob-2"),
            MediaKind::Video,
            Some("Bob"),
            &registry,
        );

        let result = classify(input, &ctx(&primary, None));
        assert_eq!(
            result.stream.owner,
            StreamOwner::Participant("Bob".to_string())
        );
        assert_eq!(result.stream.card, CardKind::Video);
    }

    #[test]
    fn test_remove_owner_drops_placeholders() {
        let mut set = StreamSet::new();
        for (track, owner) in [
            ("v-bob", StreamOwner::Pseudo("Bob".to_string())),
            ("a-bob", StreamOwner::Participant("Bob".to_string())),
            ("v-zed", StreamOwner::Pseudo("Zed".to_string())),
        ] {
            set.upsert(ClassifiedStream {
                track_id: TrackId::new(track),
                owner,
                kind: MediaKind::Video,
                bucket: Bucket::SecondaryGrid,
                card: CardKind::Mini,
            });
        }

        let joined = vec!["Zed".to_string()];
        let pending: Vec<&str> = set
            .placeholders_for(&joined)
            .map(|s| s.track_id.as_str())
            .collect();
        assert_eq!(pending, vec!["v-zed"]);

        assert_eq!(set.remove_owner("Bob").len(), 2);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_self_track_without_video_is_initials_card() {
        let registry = roster();
        let primary = PrimaryWindow::Empty;
        let input =
            ClassificationInput::resolve(TrackId::self_sentinel(), MediaKind::Video, None, &registry);
        let result = classify(input.clone(), &ctx(&primary, None));
        assert_eq!(result.stream.bucket, Bucket::SecondaryGrid);
        assert_eq!(result.stream.card, CardKind::Mini);

        let mut with_video = ctx(&primary, None);
        with_video.local_video_on = true;
        let result = classify(input, &with_video);
        assert_eq!(result.stream.bucket, Bucket::SelfView);
        assert_eq!(result.stream.card, CardKind::Video);
    }

    #[test]
    fn test_stream_set_keeps_one_bucket_per_track() {
        let mut set = StreamSet::new();
        let stream = ClassifiedStream {
            track_id: TrackId::new("v1"),
            owner: StreamOwner::Participant("Bob".to_string()),
            kind: MediaKind::Video,
            bucket: Bucket::SecondaryGrid,
            card: CardKind::Video,
        };
        set.upsert(stream.clone());
        let previous = set.upsert(ClassifiedStream {
            bucket: Bucket::Primary,
            ..stream
        });

        assert_eq!(previous.unwrap().bucket, Bucket::SecondaryGrid);
        assert_eq!(set.len(), 1);
        assert_eq!(set.primary().count(), 1);
        assert_eq!(set.grid_members().count(), 0);
    }

    #[test]
    fn test_promote_and_demote_owner() {
        let mut set = StreamSet::new();
        for (track, kind, bucket) in [
            ("a-bob", MediaKind::Audio, Bucket::AudioOnly),
            ("v-bob", MediaKind::Video, Bucket::SecondaryGrid),
        ] {
            set.upsert(ClassifiedStream {
                track_id: TrackId::new(track),
                owner: StreamOwner::Participant("Bob".to_string()),
                kind,
                bucket,
                card: CardKind::Video,
            });
        }

        assert_eq!(set.promote_owner("Bob"), 2);
        assert_eq!(set.primary().count(), 2);

        set.demote_primary(None);
        assert_eq!(
            set.get(&TrackId::new("a-bob")).unwrap().bucket,
            Bucket::AudioOnly
        );
        assert_eq!(
            set.get(&TrackId::new("v-bob")).unwrap().bucket,
            Bucket::SecondaryGrid
        );
    }
}
