//! In-memory up/down state per target URL.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::db::Status;

/// Result of comparing a new status against the cached one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub changed: bool,
    /// `None` is the pre-first-check "unknown" state.
    pub previous: Option<Status>,
}

/// Last known status as shown to readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LastStatus {
    Unknown,
    Up,
    Down,
}

impl From<Option<Status>> for LastStatus {
    fn from(status: Option<Status>) -> Self {
        match status {
            None => LastStatus::Unknown,
            Some(Status::Up) => LastStatus::Up,
            Some(Status::Down) => LastStatus::Down,
        }
    }
}

/// Tracks the last observed status of every target, keyed by URL.
///
/// Entries are never removed while the process runs.
#[derive(Debug, Default)]
pub struct StateTracker {
    states: Mutex<HashMap<String, Option<Status>>>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn states(&self) -> MutexGuard<'_, HashMap<String, Option<Status>>> {
        // The map is always consistent, so a panic elsewhere cannot corrupt it.
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a target as unknown. Keeps any status already observed.
    pub fn register(&self, url: &str) {
        self.states().entry(url.to_string()).or_insert(None);
    }

    /// Compare-and-set the status for `url`.
    pub fn observe(&self, url: &str, status: Status) -> Transition {
        let mut states = self.states();
        let previous = states.insert(url.to_string(), Some(status)).flatten();

        Transition {
            changed: previous != Some(status),
            previous,
        }
    }

    /// Copy of every tracked status.
    pub fn snapshot(&self) -> HashMap<String, LastStatus> {
        self.states()
            .iter()
            .map(|(url, status)| (url.clone(), (*status).into()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const URL: &str = "https://example.com/health";

    fn last(tracker: &StateTracker, url: &str) -> LastStatus {
        tracker
            .snapshot()
            .get(url)
            .copied()
            .unwrap_or(LastStatus::Unknown)
    }

    #[test]
    fn test_first_observation_changes_from_unknown() {
        let tracker = StateTracker::new();
        tracker.register(URL);
        assert_eq!(last(&tracker, URL), LastStatus::Unknown);

        let t = tracker.observe(URL, Status::Up);
        assert!(t.changed);
        assert_eq!(t.previous, None);
        assert_eq!(last(&tracker, URL), LastStatus::Up);
    }

    #[test]
    fn test_unregistered_url_defaults_to_unknown() {
        let tracker = StateTracker::new();
        assert_eq!(last(&tracker, URL), LastStatus::Unknown);
        let t = tracker.observe(URL, Status::Down);
        assert!(t.changed);
        assert_eq!(t.previous, None);
    }

    #[test]
    fn test_repeated_status_does_not_change() {
        let tracker = StateTracker::new();
        tracker.observe(URL, Status::Down);
        let t = tracker.observe(URL, Status::Down);
        assert!(!t.changed);
        assert_eq!(t.previous, Some(Status::Down));
    }

    #[test]
    fn test_changes_match_transitions() {
        let sequence = [
            Status::Up,
            Status::Up,
            Status::Down,
            Status::Down,
            Status::Down,
            Status::Up,
            Status::Down,
            Status::Up,
            Status::Up,
        ];

        let tracker = StateTracker::new();
        tracker.register(URL);
        let changes = sequence
            .iter()
            .filter(|s| tracker.observe(URL, **s).changed)
            .count();

        let mut expected = 1; // unknown -> first status
        expected += sequence.windows(2).filter(|w| w[0] != w[1]).count();
        assert_eq!(changes, expected);
    }

    #[test]
    fn test_register_keeps_existing_state() {
        let tracker = StateTracker::new();
        tracker.observe(URL, Status::Up);
        tracker.register(URL);
        assert_eq!(last(&tracker, URL), LastStatus::Up);
    }

    #[test]
    fn test_urls_are_independent() {
        let tracker = Arc::new(StateTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    let url = format!("http://target-{}", i);
                    let mut changes = 0;
                    for n in 0..100 {
                        let status = if n % 10 < 5 { Status::Up } else { Status::Down };
                        if tracker.observe(&url, status).changed {
                            changes += 1;
                        }
                    }
                    changes
                })
            })
            .collect();

        for handle in handles {
            // Runs of five: 20 runs, each one a transition.
            assert_eq!(handle.join().unwrap(), 20);
        }
        assert_eq!(tracker.snapshot().len(), 8);
    }
}
