//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::targets::Target;

/// Reachability of a target as classified from one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Up,
    Down,
}

impl Status {
    /// Classify a received HTTP status code. Only server errors count as down.
    pub fn from_http_code(code: u16) -> Self {
        if code >= 500 {
            Status::Down
        } else {
            Status::Up
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Up => "UP",
            Status::Down => "DOWN",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(Status::Up),
            "DOWN" => Ok(Status::Down),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// The classified result of a single probe.
///
/// `http_code` and `latency` are both `None` exactly when no response was received.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: Status,
    pub http_code: Option<u16>,
    pub latency: Option<Duration>,
    pub detail: String,
    pub observed_at: DateTime<Utc>,
}

impl Outcome {
    /// Outcome for a request that produced a response.
    pub fn response(code: u16, latency: Duration, observed_at: DateTime<Utc>) -> Self {
        Self {
            status: Status::from_http_code(code),
            http_code: Some(code),
            latency: Some(latency),
            detail: format!("HTTP {} in {}ms", code, latency.as_millis()),
            observed_at,
        }
    }

    /// Outcome for a request that failed before any response arrived.
    pub fn failure(detail: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            status: Status::Down,
            http_code: None,
            latency: None,
            detail: detail.into(),
            observed_at,
        }
    }

    pub fn latency_ms(&self) -> Option<i64> {
        self.latency.map(|l| l.as_millis() as i64)
    }
}

/// One persisted probe outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    /// Sequence id assigned by the store; 0 until appended.
    pub id: i64,
    pub name: String,
    pub url: String,
    pub status: Status,
    pub http_code: Option<u16>,
    pub latency_ms: Option<i64>,
    pub observed_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(target: &Target, outcome: &Outcome) -> Self {
        Self {
            id: 0,
            name: target.name.clone(),
            url: target.url.clone(),
            status: outcome.status,
            http_code: outcome.http_code,
            latency_ms: outcome.latency_ms(),
            observed_at: outcome.observed_at,
        }
    }
}
