//! Session Controller Library
//!
//! Client-side orchestrator for an SFU conferencing session. It decides which
//! media stream is shown where:
//!
//! - Canonical participant roster with banned/suspended filtering
//! - At most one active screen share, with deferred announcements
//! - Classification of resumed tracks into self-view, primary window,
//!   secondary grid or audio-only strip
//! - Paginated grid layout, rebuilt wholesale on every change
//! - Recording start/pause/resume/stop with cooldown and pause limits
//! - Display policy validation against recording and breakout locks
//!
//! # Architecture
//!
//! ```text
//! SessionActor (one per joined session)
//! ├── ParticipantRegistry
//! ├── ScreenShareCoordinator
//! ├── StreamSet + classifier
//! ├── GridLayoutEngine
//! ├── RecordingStateMachine
//! ├── DisplayPolicyGuard
//! └── TransportManager (send transport, consumers)
//! ```
//!
//! The signaling channel and the media transport library are consumed through
//! the [`signaling::SignalingChannel`] and [`transport::MediaTransport`]
//! traits.
//!
//! # Modules
//!
//! - [`actors`] - Session actor, messages and counters
//! - [`classifier`] - Stream classification and the classified stream set
//! - [`config`] - Configuration from environment
//! - [`display_policy`] - Display policy validation
//! - [`errors`] - Error types and alert mapping
//! - [`layout`] - Grid layout engine
//! - [`observability`] - Prometheus metrics
//! - [`recording`] - Recording state machine
//! - [`registry`] - Participant registry
//! - [`replay`] - Headless NDJSON replay support
//! - [`screen_share`] - Screen-share coordinator
//! - [`signaling`] - Signaling events, requests and channel trait
//! - [`transport`] - Media transport seam and send-transport lifecycle

pub mod actors;
pub mod classifier;
pub mod config;
pub mod display_policy;
pub mod errors;
pub mod layout;
pub mod observability;
pub mod recording;
pub mod registry;
pub mod replay;
pub mod screen_share;
pub mod signaling;
pub mod transport;
