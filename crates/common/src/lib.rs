//! Common types shared across the stage controller crates.

#![warn(clippy::pedantic)]

/// Newtype identifiers for fans, streams and connections
pub mod types;

/// Secret wrappers that keep credentials out of logs
pub mod secret;
