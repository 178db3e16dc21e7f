//! Send-transport lifecycle over the external media transport library.
//!
//! The transport library is consumed through [`MediaTransport`]. The
//! [`TransportManager`] tracks whether the send transport exists and which
//! producers are connected as an explicit [`SendTransportState`] rather than
//! loose flags.
//!
//! Teardown is best-effort: a failing producer or consumer close is logged and
//! counted, and the remaining teardown continues. Replacing a producer waits
//! a fixed delay between close and reconnect so the library can release the
//! capture device.

use crate::observability::metrics;
use async_trait::async_trait;
use common::types::TrackId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Outbound producer kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerKind {
    Audio,
    Video,
    Screen,
}

impl ProducerKind {
    /// Returns the kind as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProducerKind::Audio => "audio",
            ProducerKind::Video => "video",
            ProducerKind::Screen => "screen",
        }
    }
}

/// Opaque handle to a local capture stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalStream(pub String);

/// Errors from the media transport library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The library reported a failure.
    #[error("{0}")]
    Failed(String),
}

/// Transport library contract.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Create the send transport.
    async fn create_send_transport(&self) -> Result<(), TransportError>;

    /// Start producing `stream` as `kind`.
    async fn connect_send_transport(
        &self,
        kind: ProducerKind,
        stream: &LocalStream,
    ) -> Result<(), TransportError>;

    /// Stop producing `kind`.
    async fn disconnect_send_transport(&self, kind: ProducerKind) -> Result<(), TransportError>;

    /// Close the producer of `kind` without tearing down the transport.
    async fn close_producer(&self, kind: ProducerKind) -> Result<(), TransportError>;

    /// Close the consumer of a remote track.
    async fn close_consumer(&self, track: &TrackId) -> Result<(), TransportError>;
}

/// Send-transport lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SendTransportState {
    #[default]
    NotCreated,
    Created,
    Connected { kinds: BTreeSet<ProducerKind> },
}

impl SendTransportState {
    /// Whether `kind` is currently producing.
    #[must_use]
    pub fn is_connected(&self, kind: ProducerKind) -> bool {
        matches!(self, SendTransportState::Connected { kinds } if kinds.contains(&kind))
    }
}

/// Drives [`MediaTransport`] and owns the send-transport state.
pub struct TransportManager {
    transport: Arc<dyn MediaTransport>,
    state: SendTransportState,
    teardown_delay: Duration,
}

impl TransportManager {
    /// Create a manager; `teardown_delay` separates close from reconnect.
    pub fn new(transport: Arc<dyn MediaTransport>, teardown_delay: Duration) -> Self {
        Self {
            transport,
            state: SendTransportState::NotCreated,
            teardown_delay,
        }
    }

    /// Current send-transport state.
    #[must_use]
    pub fn state(&self) -> &SendTransportState {
        &self.state
    }

    async fn ensure_created(&mut self) -> Result<(), TransportError> {
        if self.state == SendTransportState::NotCreated {
            self.transport.create_send_transport().await?;
            debug!(target: "sc.transport", "Send transport created");
            self.state = SendTransportState::Created;
        }
        Ok(())
    }

    /// Produce `stream` as `kind`, creating the send transport if needed.
    ///
    /// # Errors
    ///
    /// Returns the library error; state is unchanged on failure.
    pub async fn connect(
        &mut self,
        kind: ProducerKind,
        stream: &LocalStream,
    ) -> Result<(), TransportError> {
        self.ensure_created().await?;
        self.transport.connect_send_transport(kind, stream).await?;

        match &mut self.state {
            SendTransportState::Connected { kinds } => {
                kinds.insert(kind);
            }
            state => {
                *state = SendTransportState::Connected {
                    kinds: BTreeSet::from([kind]),
                };
            }
        }
        info!(target: "sc.transport", kind = kind.as_str(), "Producer connected");
        Ok(())
    }

    /// Replace the producer of `kind` with `stream`.
    ///
    /// Closes the old producer (best-effort), waits the teardown delay, then
    /// reconnects.
    ///
    /// # Errors
    ///
    /// Returns the reconnect error; the old producer stays closed.
    pub async fn replace(
        &mut self,
        kind: ProducerKind,
        stream: &LocalStream,
    ) -> Result<(), TransportError> {
        if self.state.is_connected(kind) {
            if let Err(e) = self.transport.close_producer(kind).await {
                warn!(target: "sc.transport", kind = kind.as_str(), error = %e, "Producer close failed, continuing");
                metrics::record_teardown_failure(kind.as_str());
            }
            self.forget(kind);
            tokio::time::sleep(self.teardown_delay).await;
        }
        self.connect(kind, stream).await
    }

    /// Stop producing `kind`. Best-effort: failures are logged, not returned.
    pub async fn disconnect(&mut self, kind: ProducerKind) {
        if !self.state.is_connected(kind) {
            debug!(target: "sc.transport", kind = kind.as_str(), "Producer not connected, nothing to disconnect");
            return;
        }
        if let Err(e) = self.transport.disconnect_send_transport(kind).await {
            warn!(target: "sc.transport", kind = kind.as_str(), error = %e, "Disconnect failed, continuing");
            metrics::record_teardown_failure(kind.as_str());
        }
        self.forget(kind);
    }

    /// Close consumers of remote tracks. Best-effort; returns how many closed.
    pub async fn close_consumers(&self, tracks: &[TrackId]) -> usize {
        let mut closed = 0;
        for track in tracks {
            match self.transport.close_consumer(track).await {
                Ok(()) => closed += 1,
                Err(e) => {
                    warn!(target: "sc.transport", track = %track, error = %e, "Consumer close failed, continuing");
                    metrics::record_teardown_failure("consumer");
                }
            }
        }
        closed
    }

    /// Disconnect every producer (room teardown).
    pub async fn teardown_all(&mut self) {
        let kinds: Vec<ProducerKind> = match &self.state {
            SendTransportState::Connected { kinds } => kinds.iter().copied().collect(),
            _ => Vec::new(),
        };
        for kind in kinds {
            self.disconnect(kind).await;
        }
        self.state = SendTransportState::NotCreated;
    }

    fn forget(&mut self, kind: ProducerKind) {
        if let SendTransportState::Connected { kinds } = &mut self.state {
            kinds.remove(&kind);
            if kinds.is_empty() {
                self.state = SendTransportState::Created;
            }
        }
    }
}
