//! `SessionActor` - the per-session event loop.
//!
//! Owns every piece of session state (roster, screen coordinator, classified
//! streams, primary window, grid, recording machine, display policy) and
//! processes one [`SessionMessage`] at a time. Each reaction reads the state
//! as it is when the message is dequeued; state written after an awaited
//! acknowledgment is re-validated first.
//!
//! Two intervals run inside the loop:
//! - the recording clock, only while the recording timer runs
//! - the "still there" liveness ping, only while the room is non-empty
//!
//! Both are dropped on cancellation.

use super::messages::{Alert, LayoutView, SessionMessage, SessionSnapshot, SessionUpdate};
use super::metrics::SessionMetrics;
use crate::classifier::{
    classify, Bucket, CardKind, ClassificationInput, ClassifiedStream, ClassifierContext,
    PrimaryEffect, PrimaryWindow, StreamOwner, StreamSet,
};
use crate::config::Config;
use crate::display_policy::{
    DisplayPolicy, DisplayPolicyGuard, DisplayType, PolicyReason, RecordingLock,
};
use crate::errors::{AlertKind, SessionError};
use crate::layout::{GridBudget, GridLayout, GridLayoutEngine, StreamRef};
use crate::observability::metrics;
use crate::recording::{
    LocalMedia, RecordingLimits, RecordingNoticeState, RecordingSpecs, RecordingStateMachine,
    StopOutcome,
};
use crate::registry::{Participant, ParticipantRegistry};
use crate::screen_share::{AnnounceOutcome, CloseOutcome, ScreenShareCoordinator};
use crate::signaling::{
    request_checked, BreakoutStatus, RequestSettings, SignalingAck, SignalingChannel,
    SignalingEvent, SignalingRequest,
};
use crate::transport::{LocalStream, MediaTransport, ProducerKind, TransportManager};
use common::types::{MediaKind, TrackId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the session mailbox.
const SESSION_CHANNEL_BUFFER: usize = 256;

/// Handle to a `SessionActor`.
#[derive(Clone)]
pub struct SessionActorHandle {
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    session_id: String,
}

impl SessionActorHandle {
    /// Get the session ID.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionMessage,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;
        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))
    }

    /// Deliver an event pushed by the signaling channel.
    pub async fn signaling_event(&self, event: SignalingEvent) -> Result<(), SessionError> {
        self.call(|respond_to| SessionMessage::Signaling { event, respond_to })
            .await?
    }

    /// Start recording with `specs`.
    pub async fn start_recording(&self, specs: RecordingSpecs) -> Result<(), SessionError> {
        self.call(|respond_to| SessionMessage::StartRecording { specs, respond_to })
            .await?
    }

    pub async fn pause_recording(&self) -> Result<(), SessionError> {
        self.call(|respond_to| SessionMessage::PauseRecording { respond_to })
            .await?
    }

    pub async fn resume_recording(&self) -> Result<(), SessionError> {
        self.call(|respond_to| SessionMessage::ResumeRecording { respond_to })
            .await?
    }

    pub async fn stop_recording(&self) -> Result<(), SessionError> {
        self.call(|respond_to| SessionMessage::StopRecording { respond_to })
            .await?
    }

    /// Confirm the current recording settings (required before resume after
    /// a settings change).
    pub async fn confirm_recording(&self) -> Result<(), SessionError> {
        self.call(|respond_to| SessionMessage::ConfirmRecording { respond_to })
            .await
    }

    /// Request a display policy change.
    ///
    /// Returns the policy now in force, or the violation with its snapped
    /// value when a recording or breakout lock refuses the change.
    pub async fn update_display_policy(
        &self,
        policy: DisplayPolicy,
    ) -> Result<DisplayPolicy, SessionError> {
        self.call(|respond_to| SessionMessage::UpdateDisplayPolicy { policy, respond_to })
            .await?
    }

    /// Set the viewport row/column budget and get the rebuilt grid.
    pub async fn set_grid_budget(&self, budget: GridBudget) -> Result<GridLayout, SessionError> {
        self.call(|respond_to| SessionMessage::SetGridBudget { budget, respond_to })
            .await
    }

    /// Select a grid page; returns the page actually shown.
    pub async fn set_page(&self, page: usize) -> Result<usize, SessionError> {
        self.call(|respond_to| SessionMessage::SetPage { page, respond_to })
            .await
    }

    pub async fn set_local_media(&self, media: LocalMedia) -> Result<(), SessionError> {
        self.call(|respond_to| SessionMessage::SetLocalMedia { media, respond_to })
            .await
    }

    /// Publish a local capture stream, replacing any current producer.
    pub async fn publish_local_stream(
        &self,
        kind: ProducerKind,
        stream: LocalStream,
    ) -> Result<(), SessionError> {
        self.call(|respond_to| SessionMessage::PublishLocalStream {
            kind,
            stream,
            respond_to,
        })
        .await?
    }

    pub async fn unpublish_local_stream(&self, kind: ProducerKind) -> Result<(), SessionError> {
        self.call(|respond_to| SessionMessage::UnpublishLocalStream { kind, respond_to })
            .await
    }

    /// Mute a participant (host or co-host only).
    pub async fn mute_participant(
        &self,
        name: String,
        kind: MediaKind,
    ) -> Result<(), SessionError> {
        self.call(|respond_to| SessionMessage::MuteParticipant {
            name,
            kind,
            respond_to,
        })
        .await?
    }

    /// Remove, and optionally ban, a participant (host or co-host only).
    pub async fn remove_participant(&self, name: String, ban: bool) -> Result<(), SessionError> {
        self.call(|respond_to| SessionMessage::RemoveParticipant {
            name,
            ban,
            respond_to,
        })
        .await?
    }

    pub async fn update_request_settings(
        &self,
        settings: RequestSettings,
    ) -> Result<(), SessionError> {
        self.call(|respond_to| SessionMessage::UpdateRequestSettings {
            settings,
            respond_to,
        })
        .await?
    }

    /// Get an immutable snapshot of the session.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.call(|respond_to| SessionMessage::GetSnapshot { respond_to })
            .await
    }

    /// Cancel the session actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Everything the session reacts to and renders from.
struct SessionState {
    registry: ParticipantRegistry,
    screen: ScreenShareCoordinator,
    streams: StreamSet,
    primary: PrimaryWindow,
    budget: GridBudget,
    /// Page the user asked for; the layout clamps it.
    page: usize,
    grid: GridLayout,
    recording: RecordingStateMachine,
    policy: DisplayPolicy,
    /// Last policy the user asked for, restored when a breakout ends.
    requested_policy: DisplayPolicy,
    breakout_active: bool,
    breakout_rooms: Vec<Vec<String>>,
    whiteboard_active: bool,
    whiteboard_capture_active: bool,
    local_media: LocalMedia,
    request_settings: RequestSettings,
}

impl SessionState {
    fn new(budget: GridBudget, limits: RecordingLimits) -> Self {
        Self {
            registry: ParticipantRegistry::new(),
            screen: ScreenShareCoordinator::new(),
            streams: StreamSet::new(),
            primary: PrimaryWindow::Empty,
            budget,
            page: 0,
            grid: GridLayout::default(),
            recording: RecordingStateMachine::new(limits),
            policy: DisplayPolicy::default(),
            requested_policy: DisplayPolicy::default(),
            breakout_active: false,
            breakout_rooms: Vec::new(),
            whiteboard_active: false,
            whiteboard_capture_active: false,
            local_media: LocalMedia::default(),
            request_settings: RequestSettings::default(),
        }
    }

    /// Room teardown: keep the viewport budget and the user's policy.
    fn reset(&mut self) {
        let policy = self.requested_policy;
        *self = Self {
            policy,
            requested_policy: policy,
            ..Self::new(self.budget, self.recording.limits())
        };
    }
}

/// The session actor.
pub struct SessionActor {
    session_id: String,
    member_name: String,
    room_name: String,
    receiver: mpsc::Receiver<SessionMessage>,
    cancel_token: CancellationToken,
    signaling: Arc<dyn SignalingChannel>,
    transport: TransportManager,
    updates: mpsc::Sender<SessionUpdate>,
    metrics: Arc<SessionMetrics>,
    state: SessionState,
    clock_tick: Duration,
    signaling_timeout: Duration,
    liveness_period: Option<Duration>,
    clock: Option<Interval>,
    liveness: Option<Interval>,
}

impl SessionActor {
    /// Spawn a new session actor.
    ///
    /// Returns a handle and the task join handle.
    ///
    /// # Arguments
    ///
    /// * `config` - Session configuration (names, budgets, limits, intervals)
    /// * `signaling` - Request/acknowledge surface of the signaling channel
    /// * `transport` - Media transport library
    /// * `updates` - Outbound updates for the render layer
    /// * `cancel_token` - Cancellation token
    /// * `metrics` - Shared session counters
    pub fn spawn(
        config: &Config,
        signaling: Arc<dyn SignalingChannel>,
        transport: Arc<dyn MediaTransport>,
        updates: mpsc::Sender<SessionUpdate>,
        cancel_token: CancellationToken,
        metrics: Arc<SessionMetrics>,
    ) -> (SessionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);

        let limits = RecordingLimits {
            cooldown: config.pause_cooldown,
            video_pause_limit: config.video_pause_limit,
            audio_pause_limit: config.audio_pause_limit,
        };
        let budget = GridBudget::new(config.grid_rows, config.grid_cols);

        let actor = Self {
            session_id: config.session_id.clone(),
            member_name: config.member_name.clone(),
            room_name: config.room_name.clone(),
            receiver,
            cancel_token: cancel_token.clone(),
            signaling,
            transport: TransportManager::new(transport, config.teardown_delay),
            updates,
            metrics,
            state: SessionState::new(budget, limits),
            clock_tick: config.clock_tick,
            signaling_timeout: config.signaling_timeout,
            liveness_period: config.liveness_interval,
            clock: None,
            liveness: None,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionActorHandle {
            sender,
            cancel_token,
            session_id: config.session_id.clone(),
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "sc.actor.session", fields(session_id = %self.session_id))]
    async fn run(mut self) {
        info!(
            target: "sc.actor.session",
            session_id = %self.session_id,
            member = %self.member_name,
            "SessionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "sc.actor.session",
                        session_id = %self.session_id,
                        "SessionActor received cancellation signal"
                    );
                    self.teardown().await;
                    break;
                }

                _ = next_tick(&mut self.clock) => {
                    self.on_clock_tick();
                }

                _ = next_tick(&mut self.liveness) => {
                    self.on_liveness_tick().await;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.metrics.set_mailbox_depth(self.receiver.len());
                            self.handle_message(message).await;
                            self.sync_intervals();
                        }
                        None => {
                            info!(
                                target: "sc.actor.session",
                                session_id = %self.session_id,
                                "SessionActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        let counters = self.metrics.snapshot();
        info!(
            target: "sc.actor.session",
            session_id = %self.session_id,
            events = counters.events_processed,
            intents = counters.intents_processed,
            "SessionActor stopped"
        );
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Signaling { event, respond_to } => {
                let result = self.handle_event(event).await;
                self.metrics.record_event();
                let _ = respond_to.send(result);
            }

            SessionMessage::StartRecording { specs, respond_to } => {
                let result = self.handle_start_recording(specs).await;
                let result = self.finish_recording_intent(result);
                let _ = respond_to.send(result);
            }

            SessionMessage::PauseRecording { respond_to } => {
                let result = self.handle_pause_recording().await;
                let result = self.finish_recording_intent(result);
                let _ = respond_to.send(result);
            }

            SessionMessage::ResumeRecording { respond_to } => {
                let result = self.handle_resume_recording().await;
                let result = self.finish_recording_intent(result);
                let _ = respond_to.send(result);
            }

            SessionMessage::StopRecording { respond_to } => {
                let result = self.handle_stop_recording().await;
                let result = self.finish_recording_intent(result);
                let _ = respond_to.send(result);
            }

            SessionMessage::ConfirmRecording { respond_to } => {
                self.state.recording.confirm();
                self.metrics.record_intent(false);
                let _ = respond_to.send(());
            }

            SessionMessage::UpdateDisplayPolicy { policy, respond_to } => {
                let result = self.handle_update_policy(policy);
                let result = self.finish_intent(result);
                let _ = respond_to.send(result);
            }

            SessionMessage::SetGridBudget { budget, respond_to } => {
                self.state.budget = GridBudget::new(budget.rows, budget.cols);
                self.rebuild();
                self.metrics.record_intent(false);
                let _ = respond_to.send(self.state.grid.clone());
            }

            SessionMessage::SetPage { page, respond_to } => {
                self.state.page = page;
                self.rebuild();
                self.metrics.record_intent(false);
                let _ = respond_to.send(self.state.grid.current_page);
            }

            SessionMessage::SetLocalMedia { media, respond_to } => {
                self.handle_set_local_media(media);
                self.metrics.record_intent(false);
                let _ = respond_to.send(());
            }

            SessionMessage::PublishLocalStream {
                kind,
                stream,
                respond_to,
            } => {
                let result = self
                    .transport
                    .replace(kind, &stream)
                    .await
                    .map_err(SessionError::from);
                let result = self.finish_intent(result);
                let _ = respond_to.send(result);
            }

            SessionMessage::UnpublishLocalStream { kind, respond_to } => {
                self.transport.disconnect(kind).await;
                self.metrics.record_intent(false);
                let _ = respond_to.send(());
            }

            SessionMessage::MuteParticipant {
                name,
                kind,
                respond_to,
            } => {
                let result = self.handle_mute(name, kind).await;
                let result = self.finish_intent(result);
                let _ = respond_to.send(result);
            }

            SessionMessage::RemoveParticipant {
                name,
                ban,
                respond_to,
            } => {
                let result = self.handle_remove(name, ban).await;
                let result = self.finish_intent(result);
                let _ = respond_to.send(result);
            }

            SessionMessage::UpdateRequestSettings {
                settings,
                respond_to,
            } => {
                let result = self.handle_request_settings(settings).await;
                let result = self.finish_intent(result);
                let _ = respond_to.send(result);
            }

            SessionMessage::GetSnapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
        }
    }

    // ----------------------------------------------------------------------
    // Signaling events
    // ----------------------------------------------------------------------

    #[instrument(skip_all, fields(session_id = %self.session_id, event = event.name()))]
    async fn handle_event(&mut self, event: SignalingEvent) -> Result<(), SessionError> {
        debug!(target: "sc.actor.session", event = event.name(), "Signaling event");
        match event {
            SignalingEvent::AllMembers {
                participants,
                co_host,
            } => self.on_roster(participants, co_host).await,

            SignalingEvent::ProducerResumed {
                producer_id,
                kind,
                name,
            } => {
                self.classify_track(producer_id, kind, name.as_deref());
                self.rebuild();
            }

            SignalingEvent::ProducerPaused {
                producer_id, kind, ..
            } => {
                if kind == MediaKind::Video && self.state.streams.set_card(&producer_id, CardKind::Mini)
                {
                    self.rebuild();
                }
            }

            SignalingEvent::ProducerClosed { producer_id } => {
                self.on_producer_closed(producer_id).await;
            }

            SignalingEvent::ScreenProducerId { producer_id } => {
                let local_share = self
                    .state
                    .local_media
                    .screen_producer_id
                    .as_ref()
                    .map(|track| (track, self.member_name.as_str()));
                let outcome =
                    self.state
                        .screen
                        .announce(producer_id, &self.state.registry, local_share);
                self.apply_announce(outcome);
                self.rebuild();
            }

            SignalingEvent::RecordingNotice {
                state,
                pause_count,
                elapsed_ms,
                lock,
            } => {
                self.on_recording_notice(state, pause_count, elapsed_ms, lock)
                    .await;
            }

            SignalingEvent::UpdatedCoHost { co_host } => {
                self.state.registry.set_co_host(&co_host);
                info!(target: "sc.actor.session", co_host = %co_host, "Co-host updated");
            }

            SignalingEvent::ParticipantRemoved { name, banned } => {
                self.on_participant_removed(name, banned).await;
            }

            SignalingEvent::BreakoutRoomUpdated { status, rooms } => {
                self.on_breakout(status, rooms);
            }

            SignalingEvent::WhiteboardStatus {
                active,
                capture_active,
            } => self.on_whiteboard(active, capture_active),
        }
        Ok(())
    }

    async fn on_roster(&mut self, participants: Vec<Participant>, co_host: Option<String>) {
        let delta = self.state.registry.upsert_all(participants);
        if let Some(co_host) = co_host {
            self.state.registry.set_co_host(&co_host);
        }

        if delta.empty {
            // A transiently empty room must not clear the primary window.
            debug!(target: "sc.actor.session", "Empty roster snapshot, keeping classified streams");
        } else {
            // Owners that left while an empty snapshot was in force are not in
            // the delta, so sweep the classified streams as well.
            let mut gone = delta.departed;
            for stream in self.state.streams.as_slice() {
                if let StreamOwner::Participant(name) = &stream.owner {
                    if self.state.registry.find_by_name(name).is_none() && !gone.contains(name) {
                        gone.push(name.clone());
                    }
                }
            }
            for name in &gone {
                self.invalidate_participant(name).await;
            }
            self.resolve_placeholders(&delta.joined);
            if !gone.is_empty() {
                self.refill_primary();
            }
        }

        if let Some(outcome) = self.state.screen.on_roster(&self.state.registry) {
            self.apply_announce(outcome);
        }
        self.rebuild();
    }

    /// Re-classify placeholder streams whose owner has just joined.
    fn resolve_placeholders(&mut self, joined: &[String]) {
        let pending: Vec<(TrackId, MediaKind, String)> = self
            .state
            .streams
            .placeholders_for(joined)
            .map(|s| (s.track_id.clone(), s.kind, s.owner.label().to_string()))
            .collect();
        for (track, kind, name) in pending {
            debug!(target: "sc.actor.session", track = %track, name = %name, "Placeholder owner joined");
            self.classify_track(track, kind, Some(&name));
        }
    }

    /// Resolve, classify and store one resumed track.
    fn classify_track(&mut self, track: TrackId, kind: MediaKind, name_hint: Option<&str>) {
        let input = ClassificationInput::resolve(track, kind, name_hint, &self.state.registry);
        let ctx = ClassifierContext {
            local_name: &self.member_name,
            local_video_on: self.state.local_media.video_on,
            primary: &self.state.primary,
            locked_screen: self.state.screen.active_track(),
        };
        let classification = classify(input, &ctx);

        metrics::record_classification(classification.stream.bucket.as_str());
        debug!(
            target: "sc.classifier",
            track = %classification.stream.track_id,
            owner = classification.stream.owner.label(),
            bucket = classification.stream.bucket.as_str(),
            "Track classified"
        );
        self.state.streams.upsert(classification.stream);
        self.apply_effect(classification.effect);
    }

    fn apply_effect(&mut self, effect: PrimaryEffect) {
        match effect {
            PrimaryEffect::None => {}
            PrimaryEffect::Fill { name } => {
                info!(target: "sc.actor.session", name = %name, "Host fills the primary window");
                self.state.streams.promote_owner(&name);
                self.state.primary = PrimaryWindow::Participant { name };
            }
            PrimaryEffect::Repopulate { name } => {
                self.state.streams.promote_owner(&name);
            }
            PrimaryEffect::ScreenExclusive { track, owner } => {
                self.state.streams.demote_primary(Some(&track));
                self.state.primary = PrimaryWindow::Screen {
                    track,
                    owner: Some(owner),
                };
            }
        }
    }

    fn apply_announce(&mut self, outcome: AnnounceOutcome) {
        match outcome {
            AnnounceOutcome::Activated { track, owner } => {
                if let Some(existing) = self.state.streams.get(&track).cloned() {
                    self.state.streams.upsert(ClassifiedStream {
                        bucket: Bucket::Primary,
                        ..existing
                    });
                }
                self.state.streams.demote_primary(Some(&track));
                self.state.primary = PrimaryWindow::Screen {
                    track,
                    owner: Some(owner),
                };
                self.emit(SessionUpdate::ScreenShare(self.state.screen.state()));
            }
            AnnounceOutcome::Deferred { .. } => {
                self.emit(SessionUpdate::ScreenShare(self.state.screen.state()));
            }
            AnnounceOutcome::AlreadyActive => {}
            AnnounceOutcome::Rejected { active } => {
                debug!(
                    target: "sc.actor.session",
                    active = %active,
                    "Second screen announcement ignored"
                );
            }
        }
    }

    async fn on_producer_closed(&mut self, track: TrackId) {
        if self.state.streams.remove(&track).is_some() {
            self.transport
                .close_consumers(std::slice::from_ref(&track))
                .await;
        }
        let outcome = self.state.screen.close(&track, self.state.whiteboard_active);
        self.apply_close(outcome);
        self.rebuild();
    }

    fn apply_close(&mut self, outcome: CloseOutcome) {
        match outcome {
            CloseOutcome::Cleared { owner } => {
                debug!(target: "sc.actor.session", owner = %owner, "Screen slot released");
                if matches!(self.state.primary, PrimaryWindow::Screen { .. }) {
                    self.clear_primary();
                    self.refill_primary();
                }
                self.emit(SessionUpdate::ScreenShare(self.state.screen.state()));
            }
            CloseOutcome::Suppressed { .. } | CloseOutcome::DeferredDropped => {
                self.emit(SessionUpdate::ScreenShare(self.state.screen.state()));
            }
            CloseOutcome::NotScreen => {}
        }
    }

    async fn on_recording_notice(
        &mut self,
        state: RecordingNoticeState,
        pause_count: Option<u32>,
        elapsed_ms: Option<u64>,
        lock: Option<RecordingLock>,
    ) {
        let now = Instant::now();
        let reconciled = self.state.recording.reconcile(
            state,
            pause_count,
            elapsed_ms,
            self.state.whiteboard_capture_active,
            now,
        );
        if let Some(outcome) = reconciled.stopped {
            self.after_stop(outcome).await;
        }
        if let Some(lock) = lock {
            self.state.recording.adopt_lock(lock);
        }
        if reconciled.changed || lock.is_some() {
            self.emit(SessionUpdate::RecordingClock(self.state.recording.session(now)));
        }
    }

    async fn on_participant_removed(&mut self, name: String, banned: bool) {
        if name == self.member_name {
            warn!(target: "sc.actor.session", banned, "Local participant removed from the session");
            self.teardown().await;
            let message = if banned {
                "You have been banned from the session"
            } else {
                "You have been removed from the session"
            };
            self.emit(SessionUpdate::Alert(Alert::new(AlertKind::Danger, message)));
            return;
        }

        info!(target: "sc.actor.session", name = %name, banned, "Participant removed");
        self.state.registry.remove(&name);
        self.invalidate_participant(&name).await;
        self.refill_primary();
        self.rebuild();
    }

    fn on_breakout(&mut self, status: BreakoutStatus, rooms: Vec<Vec<String>>) {
        let before = self.state.policy;
        match status {
            BreakoutStatus::Started => {
                self.state.breakout_active = true;
                self.state.breakout_rooms = rooms;
                self.state.policy.display_type = DisplayType::All;
                info!(
                    target: "sc.actor.session",
                    rooms = self.state.breakout_rooms.len(),
                    "Breakout started, display forced to all"
                );
            }
            BreakoutStatus::Ended => {
                self.state.breakout_active = false;
                self.state.breakout_rooms.clear();
                let lock = self.state.recording.active_lock().copied();
                let fallback = lock.map_or(self.state.policy, |lock| DisplayPolicy {
                    display_type: lock.display_type,
                    orientation: lock.orientation,
                    video_optimized: lock.video_optimized,
                    ..self.state.policy
                });
                self.state.policy = DisplayPolicyGuard::restore_after_breakout(
                    &self.state.requested_policy,
                    &fallback,
                    lock.as_ref(),
                );
                info!(
                    target: "sc.actor.session",
                    display_type = self.state.policy.display_type.as_str(),
                    "Breakout ended, display policy restored"
                );
            }
        }
        if self.state.policy != before {
            self.state.recording.invalidate_confirmation();
        }
        self.emit_layout();
    }

    fn on_whiteboard(&mut self, active: bool, capture_active: bool) {
        self.state.whiteboard_active = active;
        self.state.whiteboard_capture_active = capture_active;
        if !active {
            // A screen close suppressed by the whiteboard left the window behind.
            let stale = match &self.state.primary {
                PrimaryWindow::Screen { track, .. } => !self.state.screen.is_locked(track),
                _ => false,
            };
            if stale {
                self.clear_primary();
                self.refill_primary();
            }
        }
        self.rebuild();
    }

    /// Drop every classified stream of `name` and release what it held.
    async fn invalidate_participant(&mut self, name: &str) {
        let removed = self.state.streams.remove_owner(name);
        if !removed.is_empty() {
            let tracks: Vec<TrackId> = removed.into_iter().map(|s| s.track_id).collect();
            self.transport.close_consumers(&tracks).await;
        }

        if self.state.primary.occupant() == Some(name) {
            self.clear_primary();
        }

        let screen = self.state.screen.state();
        if screen.owner.as_deref() == Some(name) {
            if let Some(track) = screen.active_screen_track_id {
                let outcome = self.state.screen.close(&track, self.state.whiteboard_active);
                self.apply_close(outcome);
            }
        }
        debug!(target: "sc.actor.session", name = %name, "Participant streams invalidated");
    }

    fn clear_primary(&mut self) {
        self.state.streams.demote_primary(None);
        self.state.primary = PrimaryWindow::Empty;
    }

    /// Refill an empty primary window from already-classified streams: the
    /// active screen first, then the host.
    fn refill_primary(&mut self) {
        if !self.state.primary.is_empty() {
            return;
        }
        if let Some(track) = self.state.screen.active_track().cloned() {
            let owner = self.state.screen.state().owner;
            if let Some(existing) = self.state.streams.get(&track).cloned() {
                self.state.streams.upsert(ClassifiedStream {
                    bucket: Bucket::Primary,
                    ..existing
                });
            }
            self.state.primary = PrimaryWindow::Screen { track, owner };
            return;
        }
        let Some(host) = self.state.registry.host() else {
            return;
        };
        let name = host.name.clone();
        if self.state.streams.promote_owner(&name) > 0 {
            debug!(target: "sc.actor.session", name = %name, "Primary window refilled with host");
            self.state.primary = PrimaryWindow::Participant { name };
        }
    }

    // ----------------------------------------------------------------------
    // Recording intents
    // ----------------------------------------------------------------------

    #[instrument(skip_all, fields(session_id = %self.session_id))]
    async fn handle_start_recording(&mut self, specs: RecordingSpecs) -> Result<(), SessionError> {
        self.state
            .recording
            .check_start(&specs, &self.state.local_media)?;

        let request = SignalingRequest::StartRecording {
            room_name: self.room_name.clone(),
            member: self.member_name.clone(),
            specs: specs.clone(),
        };
        self.request(request).await?;

        self.state
            .recording
            .apply_start_ack(&specs, &self.state.policy, Instant::now())?;
        Ok(())
    }

    #[instrument(skip_all, fields(session_id = %self.session_id))]
    async fn handle_pause_recording(&mut self) -> Result<(), SessionError> {
        self.state.recording.check_pause(Instant::now())?;

        let request = SignalingRequest::PauseRecord {
            room_name: self.room_name.clone(),
            member: self.member_name.clone(),
        };
        let ack = self.request(request).await?;

        self.state
            .recording
            .apply_pause_ack(ack.pause_count, Instant::now())?;
        Ok(())
    }

    #[instrument(skip_all, fields(session_id = %self.session_id))]
    async fn handle_resume_recording(&mut self) -> Result<(), SessionError> {
        self.state.recording.check_resume(Instant::now())?;

        let request = SignalingRequest::ResumeRecord {
            room_name: self.room_name.clone(),
            member: self.member_name.clone(),
        };
        self.request(request).await?;

        self.state
            .recording
            .apply_resume_ack(&self.state.policy, Instant::now())?;
        Ok(())
    }

    #[instrument(skip_all, fields(session_id = %self.session_id))]
    async fn handle_stop_recording(&mut self) -> Result<(), SessionError> {
        self.state.recording.check_stop()?;

        let request = SignalingRequest::StopRecord {
            room_name: self.room_name.clone(),
            member: self.member_name.clone(),
        };
        self.request(request).await?;

        let outcome = self
            .state
            .recording
            .apply_stop_ack(self.state.whiteboard_capture_active, Instant::now())?;
        self.after_stop(outcome).await;
        Ok(())
    }

    /// Release what a stopped recording was capturing.
    async fn after_stop(&mut self, outcome: StopOutcome) {
        if outcome.teardown_whiteboard_capture {
            info!(target: "sc.actor.session", "Tearing down whiteboard capture stream");
            self.transport.disconnect(ProducerKind::Screen).await;
            self.state.whiteboard_capture_active = false;
        }
    }

    /// Send a request and await its ack, giving up when the session is
    /// cancelled so a slow server never holds the mailbox past shutdown.
    async fn request(&self, request: SignalingRequest) -> Result<SignalingAck, SessionError> {
        let name = request.name();
        let checked = request_checked(self.signaling.as_ref(), request, self.signaling_timeout);
        tokio::select! {
            () = self.cancel_token.cancelled() => {
                debug!(target: "sc.actor.session", request = name, "Request abandoned on cancellation");
                Err(SessionError::Internal(format!("{name} abandoned, session cancelled")))
            }
            result = checked => result,
        }
    }

    /// Recording intents always report the authoritative recording state,
    /// whether they succeeded or not.
    fn finish_recording_intent(
        &mut self,
        result: Result<(), SessionError>,
    ) -> Result<(), SessionError> {
        let result = self.finish_intent(result);
        self.emit(SessionUpdate::RecordingClock(
            self.state.recording.session(Instant::now()),
        ));
        self.emit_layout();
        result
    }

    // ----------------------------------------------------------------------
    // Display, local media and moderation intents
    // ----------------------------------------------------------------------

    fn handle_update_policy(
        &mut self,
        proposed: DisplayPolicy,
    ) -> Result<DisplayPolicy, SessionError> {
        let result = DisplayPolicyGuard::validate(
            &self.state.policy,
            proposed,
            self.state.recording.active_lock(),
            self.state.breakout_active,
        );
        let before = self.state.policy;
        let outcome = match result {
            Ok(policy) => {
                self.state.requested_policy = policy;
                self.state.policy = policy;
                Ok(policy)
            }
            Err(violation) => {
                if violation.reason == PolicyReason::BreakoutRoomLock {
                    self.state.requested_policy = proposed;
                }
                self.state.policy = violation.snapped;
                Err(SessionError::from(violation))
            }
        };
        if self.state.policy != before {
            self.state.recording.invalidate_confirmation();
        }
        self.emit_layout();
        outcome
    }

    fn handle_set_local_media(&mut self, media: LocalMedia) {
        let video_changed = media.video_on != self.state.local_media.video_on;
        self.state.local_media = media;

        let self_video = self
            .state
            .streams
            .get(&TrackId::self_sentinel())
            .is_some_and(|s| s.kind == MediaKind::Video);
        if video_changed && self_video {
            self.classify_track(TrackId::self_sentinel(), MediaKind::Video, None);
        }
        self.rebuild();
    }

    fn ensure_moderator(&self) -> Result<(), SessionError> {
        if self.state.registry.can_moderate(&self.member_name) {
            Ok(())
        } else {
            Err(SessionError::PermissionDenied(
                "Only the host or co-host can do that".to_string(),
            ))
        }
    }

    #[instrument(skip_all, fields(session_id = %self.session_id, target_name = %name))]
    async fn handle_mute(&mut self, name: String, kind: MediaKind) -> Result<(), SessionError> {
        self.ensure_moderator()?;
        if self.state.registry.find_by_name(&name).is_none() {
            return Err(SessionError::ParticipantNotFound(name));
        }

        let request = SignalingRequest::ControlMedia {
            participant_name: name.clone(),
            media_type: kind,
            room_name: self.room_name.clone(),
        };
        self.request(request).await?;

        info!(target: "sc.actor.session", name = %name, kind = kind.as_str(), "Participant muted");
        Ok(())
    }

    #[instrument(skip_all, fields(session_id = %self.session_id, target_name = %name))]
    async fn handle_remove(&mut self, name: String, ban: bool) -> Result<(), SessionError> {
        self.ensure_moderator()?;
        if name == self.member_name {
            return Err(SessionError::PermissionDenied(
                "You cannot remove yourself".to_string(),
            ));
        }
        if self.state.registry.find_by_name(&name).is_none() {
            return Err(SessionError::ParticipantNotFound(name));
        }

        let request = SignalingRequest::DisconnectUser {
            member: name.clone(),
            ban,
            room_name: self.room_name.clone(),
        };
        self.request(request).await?;

        // A removal notice may have arrived while the request was in flight.
        if self.state.registry.remove(&name).is_some() {
            self.invalidate_participant(&name).await;
            self.refill_primary();
            self.rebuild();
        }
        let verb = if ban { "banned" } else { "removed" };
        self.emit(SessionUpdate::Alert(Alert::new(
            AlertKind::Success,
            format!("{name} has been {verb}"),
        )));
        Ok(())
    }

    async fn handle_request_settings(
        &mut self,
        settings: RequestSettings,
    ) -> Result<(), SessionError> {
        self.ensure_moderator()?;

        let request = SignalingRequest::UpdateSettingsForRequests {
            settings: settings.clone(),
            room_name: self.room_name.clone(),
        };
        self.request(request).await?;

        self.state.request_settings = settings;
        Ok(())
    }

    /// Count the intent and alert the user when it failed.
    fn finish_intent<T>(&mut self, result: Result<T, SessionError>) -> Result<T, SessionError> {
        self.metrics.record_intent(result.is_err());
        if let Err(error) = &result {
            match error.alert_kind() {
                Some(kind) => {
                    self.emit(SessionUpdate::Alert(Alert::new(kind, error.client_message())));
                }
                None => {
                    warn!(target: "sc.actor.session", error = %error, "Intent failed");
                }
            }
        }
        result
    }

    // ----------------------------------------------------------------------
    // Intervals
    // ----------------------------------------------------------------------

    /// Create or drop the intervals to match the current state.
    fn sync_intervals(&mut self) {
        let timer_running = self.state.recording.is_timer_running();
        if timer_running && self.clock.is_none() {
            self.clock = Some(periodic(self.clock_tick));
        } else if !timer_running && self.clock.is_some() {
            self.clock = None;
        }

        let period = self
            .liveness_period
            .filter(|_| !self.state.registry.is_empty());
        match (period, self.liveness.is_some()) {
            (Some(period), false) => self.liveness = Some(periodic(period)),
            (None, true) => self.liveness = None,
            _ => {}
        }
    }

    fn on_clock_tick(&mut self) {
        let now = Instant::now();
        if self.state.recording.tick(now).is_some() {
            self.emit(SessionUpdate::RecordingClock(self.state.recording.session(now)));
        }
        self.sync_intervals();
    }

    async fn on_liveness_tick(&mut self) {
        let request = SignalingRequest::StillThere {
            member: self.member_name.clone(),
            room_name: self.room_name.clone(),
        };
        if self.request(request).await.is_ok() {
            debug!(target: "sc.actor.session", "Liveness ping acknowledged");
        }
        self.sync_intervals();
    }

    // ----------------------------------------------------------------------
    // Output
    // ----------------------------------------------------------------------

    /// Rebuild the grid from scratch and publish the layout.
    fn rebuild(&mut self) {
        self.state.grid = GridLayoutEngine::rebuild(
            self.state.streams.as_slice(),
            self.state.budget,
            self.state.page,
        );
        metrics::set_streams_active(self.state.streams.len());
        self.emit_layout();
    }

    fn layout_view(&self) -> LayoutView {
        LayoutView {
            primary: self.state.primary.clone(),
            primary_streams: self.state.streams.primary().map(StreamRef::from).collect(),
            self_view: self.state.streams.self_view().map(StreamRef::from),
            grid: self.state.grid.clone(),
            display_policy: self.state.policy,
            breakout_active: self.state.breakout_active,
            whiteboard_active: self.state.whiteboard_active,
        }
    }

    fn emit_layout(&mut self) {
        let view = self.layout_view();
        self.emit(SessionUpdate::Layout(view));
    }

    fn emit(&mut self, update: SessionUpdate) {
        if let Err(e) = self.updates.try_send(update) {
            self.metrics.record_update_dropped();
            debug!(target: "sc.actor.session", error = %e, "Session update dropped");
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            room_name: self.room_name.clone(),
            member_name: self.member_name.clone(),
            participants: self.state.registry.all().to_vec(),
            co_host: self.state.registry.co_host().map(str::to_string),
            streams: self.state.streams.as_slice().to_vec(),
            layout: self.layout_view(),
            screen_share: self.state.screen.state(),
            recording: self.state.recording.session(Instant::now()),
            requested_policy: self.state.requested_policy,
            request_settings: self.state.request_settings.clone(),
            breakout_rooms: self.state.breakout_rooms.clone(),
            local_media: self.state.local_media.clone(),
            taken_at: chrono::Utc::now(),
        }
    }

    /// Release every consumer and producer and return to an empty session.
    async fn teardown(&mut self) {
        let tracks: Vec<TrackId> = self
            .state
            .streams
            .as_slice()
            .iter()
            .filter(|s| !s.track_id.is_self())
            .map(|s| s.track_id.clone())
            .collect();
        let closed = self.transport.close_consumers(&tracks).await;
        self.transport.teardown_all().await;
        self.state.reset();
        self.clock = None;
        self.liveness = None;
        metrics::set_streams_active(0);
        info!(
            target: "sc.actor.session",
            consumers = closed,
            "Session torn down"
        );
    }
}

/// A periodic interval whose first tick is one period from now.
fn periodic(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Tick `interval`, or never resolve when there is none.
async fn next_tick(interval: &mut Option<Interval>) -> Instant {
    match interval {
        Some(interval) => interval.tick().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::signaling::SignalingAck;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use common::types::ParticipantLevel;
    use std::collections::HashMap;

    struct AckAll;

    #[async_trait]
    impl SignalingChannel for AckAll {
        async fn request(&self, _request: SignalingRequest) -> Result<SignalingAck, SessionError> {
            Ok(SignalingAck::ok())
        }
    }

    struct NoopTransport;

    #[async_trait]
    impl MediaTransport for NoopTransport {
        async fn create_send_transport(&self) -> Result<(), TransportError> {
            Ok(())
        }
        async fn connect_send_transport(
            &self,
            _kind: ProducerKind,
            _stream: &LocalStream,
        ) -> Result<(), TransportError> {
            Ok(())
        }
        async fn disconnect_send_transport(&self, _kind: ProducerKind) -> Result<(), TransportError> {
            Ok(())
        }
        async fn close_producer(&self, _kind: ProducerKind) -> Result<(), TransportError> {
            Ok(())
        }
        async fn close_consumer(&self, _track: &TrackId) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn test_config() -> Config {
        let vars = HashMap::from([
            ("SC_MEMBER_NAME".to_string(), "Me".to_string()),
            ("SC_SESSION_ID".to_string(), "session-test".to_string()),
        ]);
        Config::from_vars(&vars).unwrap()
    }

    fn spawn_actor() -> (SessionActorHandle, mpsc::Receiver<SessionUpdate>) {
        let (tx, rx) = mpsc::channel(64);
        let (handle, _task) = SessionActor::spawn(
            &test_config(),
            Arc::new(AckAll),
            Arc::new(NoopTransport),
            tx,
            CancellationToken::new(),
            SessionMetrics::new(),
        );
        (handle, rx)
    }

    fn host() -> Participant {
        Participant {
            name: "Host".to_string(),
            audio_track_id: TrackId::new("a-host"),
            video_track_id: TrackId::new("v-host"),
            level: ParticipantLevel::Host,
            ..Participant::default()
        }
    }

    #[tokio::test]
    async fn test_session_actor_spawn_and_cancel() {
        let (handle, _updates) = spawn_actor();

        assert_eq!(handle.session_id(), "session-test");
        assert!(!handle.is_cancelled());

        handle.cancel();
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_host_video_fills_primary_through_actor() {
        let (handle, _updates) = spawn_actor();

        handle
            .signaling_event(SignalingEvent::AllMembers {
                participants: vec![host()],
                co_host: None,
            })
            .await
            .unwrap();
        handle
            .signaling_event(SignalingEvent::ProducerResumed {
                producer_id: TrackId::new("v-host"),
                kind: MediaKind::Video,
                name: Some("Host".to_string()),
            })
            .await
            .unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(
            snapshot.layout.primary,
            PrimaryWindow::Participant {
                name: "Host".to_string()
            }
        );
        assert_eq!(snapshot.layout.primary_streams.len(), 1);
        assert_eq!(snapshot.layout.grid.total_streams, 0);
    }

    #[tokio::test]
    async fn test_moderation_requires_host() {
        let (handle, mut updates) = spawn_actor();

        handle
            .signaling_event(SignalingEvent::AllMembers {
                participants: vec![
                    host(),
                    Participant {
                        name: "Me".to_string(),
                        ..Participant::default()
                    },
                ],
                co_host: None,
            })
            .await
            .unwrap();

        let err = handle
            .mute_participant("Host".to_string(), MediaKind::Audio)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::PermissionDenied(_)));

        let mut saw_alert = false;
        while let Ok(update) = updates.try_recv() {
            if let SessionUpdate::Alert(alert) = update {
                saw_alert = alert.kind == AlertKind::Danger;
            }
        }
        assert!(saw_alert);
    }

    #[tokio::test]
    async fn test_cancel_stops_actor() {
        let (tx, _rx) = mpsc::channel(64);
        let (handle, task) = SessionActor::spawn(
            &test_config(),
            Arc::new(AckAll),
            Arc::new(NoopTransport),
            tx,
            CancellationToken::new(),
            SessionMetrics::new(),
        );
        handle
            .signaling_event(SignalingEvent::AllMembers {
                participants: vec![host()],
                co_host: None,
            })
            .await
            .unwrap();

        handle.cancel();
        task.await.unwrap();

        let err = handle.snapshot().await.unwrap_err();
        assert!(matches!(err, SessionError::Internal(_)));
    }
}
