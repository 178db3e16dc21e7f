//! Mock media transport for session controller tests.
//!
//! Records each call as a short string (`create`, `connect:video:cam`,
//! `disconnect:screen`, `close:audio`, `consumer:v-bob`). Producer and
//! consumer closes can be switched to fail at any point in a test.

use async_trait::async_trait;
use common::types::TrackId;
use session_controller::transport::{LocalStream, MediaTransport, ProducerKind, TransportError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Mock media transport.
#[derive(Debug, Default)]
pub struct MockTransport {
    calls: Mutex<Vec<String>>,
    fail_closes: AtomicBool,
}

impl MockTransport {
    /// A transport where every call succeeds.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make producer, consumer and disconnect calls fail from now on.
    pub fn fail_closes(&self, fail: bool) {
        self.fail_closes.store(fail, Ordering::SeqCst);
    }

    /// Every call, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Tracks whose consumer close was attempted.
    #[must_use]
    pub fn closed_consumers(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| call.strip_prefix("consumer:").map(str::to_string))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn close_result(&self, what: &str) -> Result<(), TransportError> {
        if self.fail_closes.load(Ordering::SeqCst) {
            Err(TransportError::Failed(format!("{what} close failed")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MediaTransport for MockTransport {
    async fn create_send_transport(&self) -> Result<(), TransportError> {
        self.record("create".to_string());
        Ok(())
    }

    async fn connect_send_transport(
        &self,
        kind: ProducerKind,
        stream: &LocalStream,
    ) -> Result<(), TransportError> {
        self.record(format!("connect:{}:{}", kind.as_str(), stream.0));
        Ok(())
    }

    async fn disconnect_send_transport(&self, kind: ProducerKind) -> Result<(), TransportError> {
        self.record(format!("disconnect:{}", kind.as_str()));
        self.close_result(kind.as_str())
    }

    async fn close_producer(&self, kind: ProducerKind) -> Result<(), TransportError> {
        self.record(format!("close:{}", kind.as_str()));
        self.close_result(kind.as_str())
    }

    async fn close_consumer(&self, track: &TrackId) -> Result<(), TransportError> {
        self.record(format!("consumer:{track}"));
        self.close_result("consumer")
    }
}
