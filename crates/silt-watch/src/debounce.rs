use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Per-path debounce: coalesces event storms on a single path within a
/// configured window, while still advancing the stored timestamp on every
/// observed event (so a steady stream of edits keeps resetting the clock).
pub struct PathDebouncer {
    last_seen: Mutex<HashMap<PathBuf, DateTime<Utc>>>,
}

impl PathDebouncer {
    pub fn new() -> Self {
        Self {
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if this event should be processed (i.e. either no
    /// prior sighting of `path`, or enough time has passed since it).
    /// Always updates the stored timestamp.
    pub fn should_process(&self, path: &Path, now: DateTime<Utc>, debounce_seconds: f64) -> bool {
        let mut guard = self.last_seen.lock();
        let should = match guard.get(path) {
            Some(prev) => {
                let elapsed = (now - *prev).num_milliseconds() as f64 / 1000.0;
                elapsed >= debounce_seconds
            }
            None => true,
        };
        guard.insert(path.to_path_buf(), now);
        should
    }

    /// Drop any debounce state held for `path` (used when a path is renamed
    /// away from).
    pub fn forget(&self, path: &Path) {
        self.last_seen.lock().remove(path);
    }
}

impl Default for PathDebouncer {
    fn default() -> Self {
        Self::new()
    }
}
