//! File-system watcher driving incremental re-indexing.
//!
//! A `notify` recursive watcher feeds raw events into a channel consumed
//! by a dedicated thread. Modifications and creations are debounced per
//! path; deletions bypass the window and unwind immediately; new
//! directories trigger a walk of their subtree. Renames surface as
//! create/remove pairs or as modifications of a path that no longer
//! exists, so ready paths are re-checked against the filesystem and
//! missing ones become removals. Events for filtered paths are dropped
//! before they reach the scheduler.

pub mod debouncer;

use crate::config::Settings;
use crate::error::WatchError;
use crate::filter::PathFilter;
use crate::parsing::Language;
use crate::scheduler::IndexScheduler;
use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use debouncer::Debouncer;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Poll interval for the debounce sweep.
const SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Handle keeping the watcher thread and its OS watches alive.
pub struct FileWatcher {
    stop: Arc<AtomicBool>,
}

impl FileWatcher {
    /// Start watching the project root recursively.
    pub fn spawn(
        settings: Arc<Settings>,
        filter: Arc<PathFilter>,
        scheduler: Arc<IndexScheduler>,
    ) -> Result<Self, WatchError> {
        let (tx, rx) = unbounded::<notify::Result<Event>>();
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher.watch(&settings.project_root, RecursiveMode::Recursive)?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let debounce = Duration::from_millis(settings.watcher.debounce_ms);

        std::thread::Builder::new()
            .name("lci-watcher".to_string())
            .spawn(move || {
                // The watcher must live as long as the loop or the OS
                // subscription is dropped.
                let _watcher = watcher;
                event_loop(&rx, &thread_stop, debounce, &filter, &scheduler);
                crate::log_event!("watcher", "stopped");
            })
            .map_err(|e| WatchError::Init(notify::Error::io(e)))?;

        crate::log_event!("watcher", "started", "debounce {}ms", debounce.as_millis());
        Ok(Self { stop })
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn event_loop(
    rx: &Receiver<notify::Result<Event>>,
    stop: &AtomicBool,
    debounce: Duration,
    filter: &PathFilter,
    scheduler: &IndexScheduler,
) {
    let mut debouncer = Debouncer::new(debounce);

    while !stop.load(Ordering::Relaxed) {
        match rx.recv_timeout(SWEEP_INTERVAL) {
            Ok(Ok(event)) => handle_event(event, &mut debouncer, filter, scheduler),
            Ok(Err(e)) => tracing::error!("[watcher] backend error: {e}"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        for path in debouncer.drain_ready() {
            if path.exists() {
                scheduler.try_enqueue(path);
            } else {
                // Rename-as-modify: the path went away before the window
                // closed.
                scheduler.enqueue_remove(path);
            }
        }
    }
}

fn handle_event(
    event: Event,
    debouncer: &mut Debouncer,
    filter: &PathFilter,
    scheduler: &IndexScheduler,
) {
    for path in event.paths {
        let is_dir = path.is_dir();
        if !filter.should_index(&path, is_dir) {
            crate::debug_event!("watcher", "filtered", "{}", path.display());
            continue;
        }

        match event.kind {
            EventKind::Create(_) if is_dir => {
                crate::debug_event!("watcher", "new directory", "{}", path.display());
                scheduler.walk_subtree(&path);
            }
            EventKind::Create(_) | EventKind::Modify(_) => {
                if is_dir {
                    continue;
                }
                if !path.exists() {
                    // Rename source: gone already.
                    debouncer.forget(&path);
                    scheduler.enqueue_remove(path);
                    continue;
                }
                if Language::from_path(&path).is_some() {
                    debouncer.record(path);
                }
            }
            EventKind::Remove(_) => {
                debouncer.forget(&path);
                scheduler.enqueue_remove(path);
            }
            _ => {}
        }
    }
}
