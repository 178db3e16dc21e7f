//! Actor model implementation for the session controller.
//!
//! One `SessionActor` per joined session owns all session state and is the
//! single dispatch surface for signaling events and user intents:
//!
//! ```text
//! signaling channel ──events──┐
//!                             ▼
//! render layer ──intents──▶ SessionActor ──SessionUpdate──▶ render layer
//!                             │
//!                             ├── requests ──▶ signaling channel
//!                             └── produce/close ──▶ media transport
//! ```
//!
//! # Key Design Decisions
//!
//! - **Serialized mutation**: state changes only inside the actor loop, so no locks
//! - **Re-validation after acks**: any write that follows an await re-checks phase and presence
//! - **CancellationToken**: cancelling tears down producers, consumers and intervals
//! - **Message passing**: intents via `tokio::sync::mpsc`, replies via `oneshot`
//!
//! # Modules
//!
//! - [`session`] - `SessionActor` and its handle
//! - [`messages`] - Message and update types
//! - [`metrics`] - Per-session counters

pub mod messages;
pub mod metrics;
pub mod session;

// Re-export primary types
pub use messages::*;
pub use metrics::{SessionMetrics, SessionMetricsSnapshot};
pub use session::{SessionActor, SessionActorHandle};
