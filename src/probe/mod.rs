//! Probe module for endpoint monitoring.
//!
//! Issues HTTP GET probes and classifies them into outcomes.

mod http;

pub use http::*;

use std::time::Duration;
use thiserror::Error;

/// Probe error types. Never surfaced to callers directly; each one
/// becomes the detail text of a `DOWN` outcome.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}
