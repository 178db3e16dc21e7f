//! Common identifiers and media types shared across session controller crates.

#![warn(clippy::pedantic)]

/// Module for common error types
pub mod error;

/// Module for track, participant and media identifiers
pub mod types;
