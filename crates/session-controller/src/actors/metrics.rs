//! Session actor counters.
//!
//! Lock-free counters shared between the actor and whoever embeds it (the
//! replay binary reports them at exit). Prometheus metrics are emitted
//! separately through [`crate::observability::metrics`].

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Mailbox depth above which the actor logs that it is falling behind.
pub const SESSION_MAILBOX_WARNING: usize = 200;

/// Per-session counters.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    /// Signaling events processed.
    events_processed: AtomicU64,
    /// User intents processed.
    intents_processed: AtomicU64,
    /// Intents rejected with an error.
    intents_rejected: AtomicU64,
    /// Updates dropped because the render channel was full or closed.
    updates_dropped: AtomicU64,
    /// Current mailbox depth.
    mailbox_depth: AtomicUsize,
}

/// Point-in-time copy of [`SessionMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionMetricsSnapshot {
    pub events_processed: u64,
    pub intents_processed: u64,
    pub intents_rejected: u64,
    pub updates_dropped: u64,
    pub mailbox_depth: usize,
}

impl SessionMetrics {
    /// Create a new shared metrics instance.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record a processed signaling event.
    pub fn record_event(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a processed intent and whether it was rejected.
    pub fn record_intent(&self, rejected: bool) {
        self.intents_processed.fetch_add(1, Ordering::Relaxed);
        if rejected {
            self.intents_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an update the render layer never received.
    pub fn record_update_dropped(&self) {
        self.updates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the mailbox depth observed by the actor loop.
    pub fn set_mailbox_depth(&self, depth: usize) {
        let previous = self.mailbox_depth.swap(depth, Ordering::Relaxed);
        if depth > SESSION_MAILBOX_WARNING && previous <= SESSION_MAILBOX_WARNING {
            warn!(
                target: "sc.actor.session",
                depth,
                threshold = SESSION_MAILBOX_WARNING,
                "Session mailbox depth above warning threshold"
            );
        }
    }

    /// Take a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> SessionMetricsSnapshot {
        SessionMetricsSnapshot {
            events_processed: self.events_processed.load(Ordering::Relaxed),
            intents_processed: self.intents_processed.load(Ordering::Relaxed),
            intents_rejected: self.intents_rejected.load(Ordering::Relaxed),
            updates_dropped: self.updates_dropped.load(Ordering::Relaxed),
            mailbox_depth: self.mailbox_depth.load(Ordering::Relaxed),
        }
    }
}
