//! Recording state machine.
//!
//! ```text
//! Idle ──start──▶ Started ◀──resume── Paused
//!                    │   ──pause──▶     │
//!                    └──────stop────────┴──▶ Stopped
//! ```
//!
//! Every transition is split into a `check_*` step, run before the request is
//! sent to the signaling channel, and an `apply_*` step, run after the
//! acknowledgment arrives. `apply_*` re-validates the phase because another
//! event may have moved the machine while the request was in flight.
//!
//! Time is passed in explicitly as a [`tokio::time::Instant`]. Elapsed time is
//! recomputed from the start epoch on every tick, never accumulated.

use crate::display_policy::{DisplayPolicy, DisplayType, Orientation, RecordingLock};
use crate::errors::RecordingError;
use crate::observability::metrics;
use common::types::{MediaKind, TrackId};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Recording phase. `Stopped` is terminal until the room resets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingPhase {
    #[default]
    Idle,
    Started,
    Paused,
    Stopped,
}

impl RecordingPhase {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            RecordingPhase::Idle => "idle",
            RecordingPhase::Started => "started",
            RecordingPhase::Paused => "paused",
            RecordingPhase::Stopped => "stopped",
        }
    }
}

/// Server-pushed recording state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingNoticeState {
    Pause,
    Stop,
    Progress,
}

/// What is recorded and how the layout is composed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainSpecs {
    pub media_options: MediaKind,
    pub audio_options: String,
    pub video_options: String,
    pub video_type: String,
    pub video_optimized: bool,
    pub recording_display_type: DisplayType,
    pub add_hls: bool,
}

impl Default for MainSpecs {
    fn default() -> Self {
        Self {
            media_options: MediaKind::Video,
            audio_options: "all".to_string(),
            video_options: "all".to_string(),
            video_type: "fullDisplay".to_string(),
            video_optimized: false,
            recording_display_type: DisplayType::Video,
            add_hls: false,
        }
    }
}

/// Visual decoration of the recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispSpecs {
    pub name_tags: bool,
    pub background_color: String,
    pub name_tags_color: String,
    pub orientation_video: Orientation,
}

impl Default for DispSpecs {
    fn default() -> Self {
        Self {
            name_tags: true,
            background_color: "#000000".to_string(),
            name_tags_color: "#ffffff".to_string(),
            orientation_video: Orientation::Landscape,
        }
    }
}

/// Optional overlay text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSpecs {
    pub add_text: bool,
    pub custom_text: String,
    pub custom_text_position: String,
    pub custom_text_color: String,
}

impl Default for TextSpecs {
    fn default() -> Self {
        Self {
            add_text: false,
            custom_text: "Add Text".to_string(),
            custom_text_position: "top".to_string(),
            custom_text_color: "#ffffff".to_string(),
        }
    }
}

/// Recording parameters sent with `startRecordIng`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSpecs {
    #[serde(rename = "mainSpecs", default)]
    pub main: MainSpecs,
    #[serde(rename = "dispSpecs", default)]
    pub disp: DispSpecs,
    #[serde(rename = "textSpecs", default)]
    pub text: TextSpecs,
}

/// Cooldown and per-kind pause limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingLimits {
    pub cooldown: Duration,
    pub video_pause_limit: u32,
    pub audio_pause_limit: u32,
}

impl RecordingLimits {
    #[must_use]
    pub const fn pause_limit(&self, kind: MediaKind) -> u32 {
        match kind {
            MediaKind::Video => self.video_pause_limit,
            MediaKind::Audio => self.audio_pause_limit,
        }
    }
}

/// Local capture state; recording start depends on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalMedia {
    #[serde(default)]
    pub audio_on: bool,
    #[serde(default)]
    pub video_on: bool,
    /// Producer id of the local screen share, while sharing.
    #[serde(default)]
    pub screen_producer_id: Option<TrackId>,
}

/// Side effects requested by a stop acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOutcome {
    /// A whiteboard capture stream was feeding a video recording and must go.
    pub teardown_whiteboard_capture: bool,
    pub elapsed_seconds: u64,
}

/// Effect of a server-pushed recording notice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciled {
    /// Phase, pause count or elapsed time changed.
    pub changed: bool,
    /// Set when the notice stopped the recording.
    pub stopped: Option<StopOutcome>,
}

/// Serializable view of the recording session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    pub phase: RecordingPhase,
    pub elapsed_seconds: u64,
    pub elapsed: String,
    pub pause_count: u32,
    pub pause_limit: u32,
    pub timer_running: bool,
    pub cooldown_remaining_secs: u64,
    pub confirmed: bool,
    pub media_kind: MediaKind,
    pub locked_display_type: Option<DisplayType>,
    pub locked_orientation: Option<Orientation>,
}

/// Format seconds as `HH:MM:SS`.
#[must_use]
pub fn format_elapsed(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

/// Start/pause/resume/stop gating and the elapsed-time clock.
#[derive(Debug, Clone)]
pub struct RecordingStateMachine {
    phase: RecordingPhase,
    limits: RecordingLimits,
    media_kind: MediaKind,
    pause_count: u32,
    elapsed_seconds: u64,
    /// `Some` exactly while the clock runs.
    start_epoch: Option<Instant>,
    cooldown_until: Option<Instant>,
    confirmed: bool,
    /// The display policy changed while paused; resume re-locks from it.
    relock_on_resume: bool,
    lock: Option<RecordingLock>,
}

impl RecordingStateMachine {
    #[must_use]
    pub fn new(limits: RecordingLimits) -> Self {
        Self {
            phase: RecordingPhase::Idle,
            limits,
            media_kind: MediaKind::Video,
            pause_count: 0,
            elapsed_seconds: 0,
            start_epoch: None,
            cooldown_until: None,
            confirmed: false,
            relock_on_resume: false,
            lock: None,
        }
    }

    #[must_use]
    pub fn phase(&self) -> RecordingPhase {
        self.phase
    }

    #[must_use]
    pub fn pause_count(&self) -> u32 {
        self.pause_count
    }

    #[must_use]
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    #[must_use]
    pub fn is_timer_running(&self) -> bool {
        self.start_epoch.is_some()
    }

    #[must_use]
    pub fn limits(&self) -> RecordingLimits {
        self.limits
    }

    /// Pause limit for the media kind being recorded.
    #[must_use]
    pub fn pause_limit(&self) -> u32 {
        self.limits.pause_limit(self.media_kind)
    }

    /// The display lock, present only while started and unpaused.
    #[must_use]
    pub fn active_lock(&self) -> Option<&RecordingLock> {
        match self.phase {
            RecordingPhase::Started => self.lock.as_ref(),
            _ => None,
        }
    }

    /// Whether pause/resume is allowed at `now` (cooldown elapsed).
    #[must_use]
    pub fn can_pause_resume(&self, now: Instant) -> bool {
        self.cooldown_until.map_or(true, |until| now >= until)
    }

    fn check_cooldown(&self, now: Instant) -> Result<(), RecordingError> {
        match self.cooldown_until {
            Some(until) if now < until => {
                let remaining = until.duration_since(now);
                let remaining_secs =
                    remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                Err(RecordingError::CooldownActive {
                    cooldown_secs: self.limits.cooldown.as_secs(),
                    remaining_secs,
                })
            }
            _ => Ok(()),
        }
    }

    /// Validate a start request against local media.
    ///
    /// # Errors
    ///
    /// Rejects when a recording is in progress or stopped, or the chosen media
    /// option needs a local track that is off.
    pub fn check_start(
        &self,
        specs: &RecordingSpecs,
        local: &LocalMedia,
    ) -> Result<(), RecordingError> {
        match self.phase {
            RecordingPhase::Started | RecordingPhase::Paused => {
                return Err(RecordingError::AlreadyStarted)
            }
            RecordingPhase::Stopped => return Err(RecordingError::AlreadyStopped),
            RecordingPhase::Idle => {}
        }
        let enabled = match specs.main.media_options {
            MediaKind::Video => local.video_on,
            MediaKind::Audio => local.audio_on,
        };
        if !enabled {
            return Err(RecordingError::MediaNotEnabled(specs.main.media_options));
        }
        Ok(())
    }

    /// Apply a successful start acknowledgment; locks the display policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the phase moved while the request was in flight.
    pub fn apply_start_ack(
        &mut self,
        specs: &RecordingSpecs,
        policy: &DisplayPolicy,
        now: Instant,
    ) -> Result<(), RecordingError> {
        match self.phase {
            RecordingPhase::Idle => {}
            RecordingPhase::Stopped => return Err(RecordingError::AlreadyStopped),
            RecordingPhase::Started | RecordingPhase::Paused => {
                return Err(RecordingError::AlreadyStarted)
            }
        }
        self.phase = RecordingPhase::Started;
        self.media_kind = specs.main.media_options;
        self.pause_count = 0;
        self.elapsed_seconds = 0;
        self.start_epoch = Some(now);
        self.cooldown_until = Some(now + self.limits.cooldown);
        self.confirmed = true;
        self.lock = Some(RecordingLock::from_policy(policy));
        metrics::record_recording_transition("start");
        info!(
            target: "sc.recording",
            media = self.media_kind.as_str(),
            display_type = policy.display_type.as_str(),
            "Recording started"
        );
        Ok(())
    }

    /// Validate a pause request.
    ///
    /// # Errors
    ///
    /// Rejects unless the timer is running, the pause limit is not reached and
    /// the cooldown has elapsed.
    pub fn check_pause(&self, now: Instant) -> Result<(), RecordingError> {
        match self.phase {
            RecordingPhase::Started => {}
            RecordingPhase::Paused => return Err(RecordingError::TimerNotRunning),
            RecordingPhase::Stopped => return Err(RecordingError::AlreadyStopped),
            RecordingPhase::Idle => return Err(RecordingError::NotStarted),
        }
        if !self.is_timer_running() {
            return Err(RecordingError::TimerNotRunning);
        }
        let limit = self.pause_limit();
        if self.pause_count >= limit {
            return Err(RecordingError::PauseLimitReached { limit });
        }
        self.check_cooldown(now)
    }

    /// Apply a successful pause acknowledgment.
    ///
    /// The pause count comes from the server. If the ack carries none, the
    /// local count is kept unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the recording left `Started` while in flight.
    pub fn apply_pause_ack(
        &mut self,
        server_pause_count: Option<u32>,
        now: Instant,
    ) -> Result<(), RecordingError> {
        if self.phase != RecordingPhase::Started {
            return Err(RecordingError::NotStarted);
        }
        self.tick(now);
        self.start_epoch = None;
        self.phase = RecordingPhase::Paused;
        self.cooldown_until = Some(now + self.limits.cooldown);
        match server_pause_count {
            Some(count) => self.pause_count = count,
            None => warn!(
                target: "sc.recording",
                pause_count = self.pause_count,
                "Pause ack carried no pause count, keeping local value"
            ),
        }
        metrics::record_recording_transition("pause");
        info!(
            target: "sc.recording",
            pause_count = self.pause_count,
            elapsed = self.elapsed_seconds,
            "Recording paused"
        );
        Ok(())
    }

    /// Validate a resume request.
    ///
    /// # Errors
    ///
    /// Rejects unless paused, within the pause limit, confirmed and past the
    /// cooldown.
    pub fn check_resume(&self, now: Instant) -> Result<(), RecordingError> {
        match self.phase {
            RecordingPhase::Paused => {}
            RecordingPhase::Stopped => return Err(RecordingError::AlreadyStopped),
            RecordingPhase::Idle => return Err(RecordingError::NotStarted),
            RecordingPhase::Started => return Err(RecordingError::NotPaused),
        }
        let limit = self.pause_limit();
        if self.pause_count > limit {
            return Err(RecordingError::PauseLimitReached { limit });
        }
        if !self.confirmed {
            return Err(RecordingError::NotConfirmed);
        }
        self.check_cooldown(now)
    }

    /// Apply a successful resume acknowledgment; the clock restarts at
    /// `now - elapsed` so displayed time is continuous.
    ///
    /// Settings confirmed after a change made while paused become the new
    /// display lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the recording left `Paused` while in flight.
    pub fn apply_resume_ack(
        &mut self,
        policy: &DisplayPolicy,
        now: Instant,
    ) -> Result<(), RecordingError> {
        if self.phase != RecordingPhase::Paused {
            return Err(RecordingError::NotPaused);
        }
        self.restart_clock(now);
        self.phase = RecordingPhase::Started;
        self.cooldown_until = Some(now + self.limits.cooldown);
        if std::mem::take(&mut self.relock_on_resume) {
            self.lock = Some(RecordingLock::from_policy(policy));
            info!(
                target: "sc.recording",
                display_type = policy.display_type.as_str(),
                "Recording display lock re-taken from confirmed settings"
            );
        }
        metrics::record_recording_transition("resume");
        info!(target: "sc.recording", elapsed = self.elapsed_seconds, "Recording resumed");
        Ok(())
    }

    /// Validate a stop request.
    ///
    /// # Errors
    ///
    /// Rejects when not started or already stopped.
    pub fn check_stop(&self) -> Result<(), RecordingError> {
        match self.phase {
            RecordingPhase::Started | RecordingPhase::Paused => Ok(()),
            RecordingPhase::Stopped => Err(RecordingError::AlreadyStopped),
            RecordingPhase::Idle => Err(RecordingError::NotStarted),
        }
    }

    /// Apply a successful stop acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns an error if the recording was already stopped while in flight.
    pub fn apply_stop_ack(
        &mut self,
        whiteboard_capture_active: bool,
        now: Instant,
    ) -> Result<StopOutcome, RecordingError> {
        self.check_stop()?;
        self.tick(now);
        Ok(self.stop(whiteboard_capture_active))
    }

    fn stop(&mut self, whiteboard_capture_active: bool) -> StopOutcome {
        let outcome = StopOutcome {
            teardown_whiteboard_capture: whiteboard_capture_active
                && self.media_kind == MediaKind::Video,
            elapsed_seconds: self.elapsed_seconds,
        };
        self.phase = RecordingPhase::Stopped;
        self.start_epoch = None;
        self.cooldown_until = None;
        self.relock_on_resume = false;
        self.lock = None;
        metrics::record_recording_transition("stop");
        info!(
            target: "sc.recording",
            elapsed = %format_elapsed(outcome.elapsed_seconds),
            "Recording stopped"
        );
        outcome
    }

    /// Recompute elapsed seconds. Returns the new value while the clock runs.
    pub fn tick(&mut self, now: Instant) -> Option<u64> {
        let epoch = self.start_epoch?;
        let millis = now.saturating_duration_since(epoch).as_millis();
        self.elapsed_seconds = u64::try_from(millis / 1000).unwrap_or(u64::MAX);
        Some(self.elapsed_seconds)
    }

    /// Mark the current settings as confirmed for recording.
    pub fn confirm(&mut self) {
        self.confirmed = true;
    }

    /// Settings changed while paused; resume needs a fresh confirmation.
    pub fn invalidate_confirmation(&mut self) {
        if self.phase != RecordingPhase::Paused {
            return;
        }
        self.relock_on_resume = true;
        if self.confirmed {
            debug!(target: "sc.recording", "Recording settings changed, confirmation required");
            self.confirmed = false;
        }
    }

    /// Adopt a server-pushed recording notice.
    ///
    /// A stop notice ends the recording exactly like a stop acknowledgment.
    pub fn reconcile(
        &mut self,
        state: RecordingNoticeState,
        pause_count: Option<u32>,
        elapsed_ms: Option<u64>,
        whiteboard_capture_active: bool,
        now: Instant,
    ) -> Reconciled {
        let before = (self.phase, self.pause_count, self.elapsed_seconds);
        let mut stopped = None;
        if let Some(count) = pause_count {
            self.pause_count = count;
        }
        if let Some(ms) = elapsed_ms {
            self.elapsed_seconds = ms / 1000;
        }

        match (state, self.phase) {
            (_, RecordingPhase::Stopped) => {}
            (RecordingNoticeState::Stop, RecordingPhase::Idle) => {
                self.phase = RecordingPhase::Stopped;
            }
            (RecordingNoticeState::Stop, RecordingPhase::Started | RecordingPhase::Paused) => {
                if elapsed_ms.is_none() {
                    self.tick(now);
                }
                stopped = Some(self.stop(whiteboard_capture_active));
            }
            (RecordingNoticeState::Pause, RecordingPhase::Started) => {
                if elapsed_ms.is_none() {
                    self.tick(now);
                }
                self.start_epoch = None;
                self.phase = RecordingPhase::Paused;
                self.cooldown_until = Some(now + self.limits.cooldown);
            }
            (RecordingNoticeState::Progress, RecordingPhase::Idle | RecordingPhase::Paused) => {
                self.restart_clock(now);
                self.phase = RecordingPhase::Started;
                self.confirmed = true;
            }
            (RecordingNoticeState::Progress, RecordingPhase::Started) => {
                if elapsed_ms.is_some() {
                    self.restart_clock(now);
                }
            }
            (RecordingNoticeState::Pause, _) => {}
        }

        let changed = before != (self.phase, self.pause_count, self.elapsed_seconds);
        if changed {
            debug!(
                target: "sc.recording",
                phase = self.phase.as_str(),
                pause_count = self.pause_count,
                elapsed = self.elapsed_seconds,
                "Recording state reconciled with server"
            );
        }
        Reconciled { changed, stopped }
    }

    /// Adopt display locks pushed by the server for a recording in progress.
    pub fn adopt_lock(&mut self, lock: RecordingLock) {
        if matches!(self.phase, RecordingPhase::Started | RecordingPhase::Paused) {
            self.lock = Some(lock);
        }
    }

    /// Back to `Idle` (room teardown).
    pub fn reset(&mut self) {
        *self = Self::new(self.limits);
    }

    /// Serializable view at `now`.
    #[must_use]
    pub fn session(&self, now: Instant) -> RecordingSession {
        let cooldown_remaining_secs = match self.check_cooldown(now) {
            Err(RecordingError::CooldownActive { remaining_secs, .. }) => remaining_secs,
            _ => 0,
        };
        RecordingSession {
            phase: self.phase,
            elapsed_seconds: self.elapsed_seconds,
            elapsed: format_elapsed(self.elapsed_seconds),
            pause_count: self.pause_count,
            pause_limit: self.pause_limit(),
            timer_running: self.is_timer_running(),
            cooldown_remaining_secs,
            confirmed: self.confirmed,
            media_kind: self.media_kind,
            locked_display_type: self.lock.map(|l| l.display_type),
            locked_orientation: self.lock.map(|l| l.orientation),
        }
    }

    fn restart_clock(&mut self, now: Instant) {
        let elapsed = Duration::from_secs(self.elapsed_seconds);
        self.start_epoch = Some(now.checked_sub(elapsed).unwrap_or(now));
    }
}
