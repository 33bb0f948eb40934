//! Per-path debouncing of file change events.
//!
//! Editors save in bursts (write-temp, rename, touch); the debouncer
//! coalesces everything that lands on one path within the window so a
//! burst produces a single re-index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Debouncer {
    /// Path -> instant the entry becomes ready.
    pending: HashMap<PathBuf, Instant>,
    window: Duration,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            window,
        }
    }

    /// Record a change; any earlier pending entry for the path restarts
    /// its window.
    pub fn record(&mut self, path: PathBuf) {
        self.pending.insert(path, Instant::now() + self.window);
    }

    /// Drop a pending entry (the path was deleted).
    pub fn forget(&mut self, path: &Path) {
        self.pending.remove(path);
    }

    /// Remove and return every path whose window has elapsed.
    pub fn drain_ready(&mut self) -> Vec<PathBuf> {
        let now = Instant::now();
        let mut ready = Vec::new();
        self.pending.retain(|path, due| {
            if *due <= now {
                ready.push(path.clone());
                false
            } else {
                true
            }
        });
        ready
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
