//! Common error types for parsing shared identifiers.

use thiserror::Error;

/// Errors raised when decoding shared wire values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// A media kind string was not `audio` or `video`.
    #[error("Unknown media kind: {0}")]
    UnknownMediaKind(String),

    /// A participant level outside the known range.
    #[error("Unknown participant level: {0}")]
    UnknownLevel(u8),
}
