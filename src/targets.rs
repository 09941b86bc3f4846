//! Target registry: the immutable list of monitored endpoints.
//!
//! Targets are read once from a YAML document at startup:
//!
//! ```yaml
//! targets:
//!   - name: api
//!     url: https://example.com/health
//!     interval: 30
//! ```

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::config::duration_from_secs;

/// Target list loading errors. All of them are fatal at startup.
#[derive(Error, Debug)]
pub enum TargetsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid target #{index}: {reason}")]
    Invalid { index: usize, reason: String },
    #[error("no targets configured")]
    Empty,
}

/// A monitored HTTP endpoint.
///
/// Identity is the URL: two targets with the same URL share transition state.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: String,
    pub url: String,
    /// Own check interval; `None` means the global default applies.
    pub interval: Option<Duration>,
}

impl Target {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            interval: None,
        }
    }

    #[cfg(test)]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// The interval this target actually runs on.
    pub fn effective_interval(&self, default: Duration) -> Duration {
        self.interval.unwrap_or(default)
    }
}

#[derive(Debug, Deserialize)]
struct TargetFile {
    #[serde(default)]
    targets: Vec<RawTarget>,
}

#[derive(Debug, Deserialize)]
struct RawTarget {
    name: Option<String>,
    url: Option<String>,
    /// Seconds, integer or fractional.
    interval: Option<f64>,
}

/// Holds the targets loaded at startup. Never mutated afterwards.
#[derive(Debug, Clone)]
pub struct TargetRegistry {
    targets: Vec<Target>,
}

impl TargetRegistry {
    /// Load and validate the target list from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TargetsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| TargetsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a YAML target document.
    pub fn from_yaml(content: &str) -> Result<Self, TargetsError> {
        let file: TargetFile = serde_yaml::from_str(content)?;
        let targets = file
            .targets
            .into_iter()
            .enumerate()
            .map(|(index, raw)| validate(index, raw))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(targets)
    }

    /// Build a registry from already-constructed targets.
    pub fn new(targets: Vec<Target>) -> Result<Self, TargetsError> {
        if targets.is_empty() {
            return Err(TargetsError::Empty);
        }

        let mut seen = HashSet::new();
        for target in &targets {
            if !seen.insert(target.url.as_str()) {
                tracing::warn!(
                    "Target {} reuses URL {}; targets sharing a URL share up/down state",
                    target.name,
                    target.url
                );
            }
        }

        Ok(Self { targets })
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

fn validate(index: usize, raw: RawTarget) -> Result<Target, TargetsError> {
    let invalid = |reason: &str| TargetsError::Invalid {
        index,
        reason: reason.to_string(),
    };

    let url = raw
        .url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| invalid("missing url"))?;

    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(invalid(&format!("url {} must start with http:// or https://", url)));
    }

    let interval = match raw.interval {
        None => None,
        Some(secs) => match duration_from_secs(secs) {
            Some(interval) => Some(interval),
            None => {
                return Err(invalid(&format!(
                    "interval must be between 1ms and the maximum duration, got {}",
                    secs
                )))
            }
        },
    };

    let name = raw
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| url.clone());

    Ok(Target {
        interval,
        ..Target::new(name, url)
    })
}
