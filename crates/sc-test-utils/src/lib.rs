//! # Session Controller Test Utilities
//!
//! Mock implementations and fixtures for driving a `SessionActor` without a
//! signaling server or a media transport library.
//!
//! ## Modules
//!
//! - `mock_signaling` - Scripted signaling channel that records requests
//! - `mock_transport` - Media transport that records calls and can fail closes
//! - `fixtures` - Roster builders, config and a spawned test session
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let session = TestSession::builder("Me")
//!         .signaling(MockSignaling::builder().reject("pauseRecord", "busy").build())
//!         .start();
//!
//!     session
//!         .handle
//!         .signaling_event(RosterBuilder::new().host("Host").member("Bob").event())
//!         .await
//!         .unwrap();
//!
//!     // Run your test...
//! }
//! ```

pub mod fixtures;
pub mod mock_signaling;
pub mod mock_transport;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_signaling::*;
pub use mock_transport::*;
