//! Mock signaling channel for session controller tests.
//!
//! Records every request and answers from a per-request script. Requests
//! without a scripted answer are acknowledged; pause acknowledgments carry an
//! incrementing pause count the way the server does.
//!
//! # Example
//!
//! ```rust,ignore
//! use sc_test_utils::MockSignaling;
//!
//! let signaling = MockSignaling::builder()
//!     .reject("stopRecord", "recording service unavailable")
//!     .with_pause_count(2)
//!     .build();
//! ```

use async_trait::async_trait;
use session_controller::errors::SessionError;
use session_controller::signaling::{SignalingAck, SignalingChannel, SignalingRequest};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A scripted answer to one request.
#[derive(Debug, Clone)]
enum Scripted {
    Ack(SignalingAck),
    Unreachable(String),
}

/// Mock signaling channel.
#[derive(Debug, Default)]
pub struct MockSignaling {
    requests: Mutex<Vec<SignalingRequest>>,
    script: Mutex<HashMap<String, VecDeque<Scripted>>>,
    pause_count: AtomicU32,
    latency: Option<Duration>,
}

impl MockSignaling {
    /// Create a MockSignaling builder.
    #[must_use]
    pub fn builder() -> MockSignalingBuilder {
        MockSignalingBuilder::default()
    }

    /// A mock that acknowledges everything.
    #[must_use]
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue an acknowledgment for the next `request` (wire name).
    pub fn script_ack(&self, request: &str, ack: SignalingAck) {
        self.push(request, Scripted::Ack(ack));
    }

    /// Queue a `success: false` acknowledgment for the next `request`.
    pub fn script_reject(&self, request: &str, reason: &str) {
        self.push(request, Scripted::Ack(SignalingAck::rejected(reason)));
    }

    /// Queue a transport-level failure for the next `request`.
    pub fn script_unreachable(&self, request: &str) {
        self.push(
            request,
            Scripted::Unreachable(format!("{request}: connection lost")),
        );
    }

    /// Every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<SignalingRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Wire names of every request received, in order.
    #[must_use]
    pub fn request_names(&self) -> Vec<&'static str> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(SignalingRequest::name)
            .collect()
    }

    /// Every request as it would go on the wire.
    #[must_use]
    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.requests()
            .iter()
            .map(|r| serde_json::to_value(r).unwrap())
            .collect()
    }

    /// Number of requests with the given wire name.
    #[must_use]
    pub fn count(&self, request: &str) -> usize {
        self.request_names()
            .into_iter()
            .filter(|name| *name == request)
            .count()
    }

    fn push(&self, request: &str, answer: Scripted) {
        self.script
            .lock()
            .unwrap()
            .entry(request.to_string())
            .or_default()
            .push_back(answer);
    }

    fn next_scripted(&self, request: &str) -> Option<Scripted> {
        self.script
            .lock()
            .unwrap()
            .get_mut(request)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl SignalingChannel for MockSignaling {
    async fn request(&self, request: SignalingRequest) -> Result<SignalingAck, SessionError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let name = request.name();
        let is_pause = matches!(request, SignalingRequest::PauseRecord { .. });
        self.requests.lock().unwrap().push(request);

        match self.next_scripted(name) {
            Some(Scripted::Ack(ack)) => Ok(ack),
            Some(Scripted::Unreachable(message)) => Err(SessionError::Signaling(message)),
            None if is_pause => Ok(SignalingAck {
                pause_count: Some(self.pause_count.fetch_add(1, Ordering::SeqCst) + 1),
                ..SignalingAck::ok()
            }),
            None => Ok(SignalingAck::ok()),
        }
    }
}

/// Builder for MockSignaling configuration.
#[derive(Debug, Default)]
pub struct MockSignalingBuilder {
    script: Vec<(String, Scripted)>,
    pause_count: u32,
    latency: Option<Duration>,
}

impl MockSignalingBuilder {
    /// Answer the first `request` with `ack`.
    #[must_use]
    pub fn ack(mut self, request: &str, ack: SignalingAck) -> Self {
        self.script.push((request.to_string(), Scripted::Ack(ack)));
        self
    }

    /// Reject the first `request` with a server reason.
    #[must_use]
    pub fn reject(mut self, request: &str, reason: &str) -> Self {
        self.script.push((
            request.to_string(),
            Scripted::Ack(SignalingAck::rejected(reason)),
        ));
        self
    }

    /// Fail the first `request` as if the channel dropped.
    #[must_use]
    pub fn unreachable(mut self, request: &str) -> Self {
        self.script.push((
            request.to_string(),
            Scripted::Unreachable(format!("{request}: connection lost")),
        ));
        self
    }

    /// Server-side pause count before the first automatic pause ack.
    #[must_use]
    pub fn with_pause_count(mut self, count: u32) -> Self {
        self.pause_count = count;
        self
    }

    /// Delay every acknowledgment.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Build the MockSignaling.
    #[must_use]
    pub fn build(self) -> Arc<MockSignaling> {
        let mock = MockSignaling {
            pause_count: AtomicU32::new(self.pause_count),
            latency: self.latency,
            ..MockSignaling::default()
        };
        for (request, answer) in self.script {
            mock.push(&request, answer);
        }
        Arc::new(mock)
    }
}
