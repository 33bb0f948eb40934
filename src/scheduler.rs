//! Indexing scheduler: a bounded pool of worker threads draining a queue
//! of paths.
//!
//! Each work item is idempotent: parse, compute the delta, then swap it in
//! under the coordinator's write locks. A parse failure is isolated to its
//! file and never rolls back others. The bounded queue applies
//! backpressure to the walker; the watcher uses non-blocking enqueue and
//! relies on its own retry-on-next-event behavior when the queue is full.
//!
//! When the approximate index memory breaches the configured ceiling, new
//! paths are deferred and an eviction pass drops the least-recently-touched
//! committed entries until usage falls under the low-water mark.

use crate::config::Settings;
use crate::error::{IndexError, IndexResult};
use crate::filter::PathFilter;
use crate::index::{FileDelta, FileEntry, FileState, IndexCoordinator, IndexKind};
use crate::parsing::{Language, ParserRegistry};
use crate::types::FileId;
use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Fraction of the ceiling eviction drains down to.
const LOW_WATER_RATIO: f64 = 0.8;
/// Commits between memory accounting passes.
const MEMORY_CHECK_INTERVAL: usize = 32;

#[derive(Debug)]
enum Job {
    Index(PathBuf),
    Remove(PathBuf),
}

/// Shared progress counters, surfaced by the status RPC.
#[derive(Debug, Default)]
pub struct Progress {
    queued: AtomicUsize,
    in_flight: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    deferred: AtomicUsize,
    removed: AtomicUsize,
    walk_total: AtomicUsize,
    walk_done: AtomicBool,
    ready: AtomicBool,
    over_ceiling: AtomicBool,
    approx_bytes: AtomicUsize,
    build_duration_ms: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct ProgressSnapshot {
    pub queued: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub deferred: usize,
    pub removed: usize,
    /// Files the last full walk queued.
    pub walk_total: usize,
}

impl Progress {
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            queued: self.queued.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            walk_total: self.walk_total.load(Ordering::Relaxed),
        }
    }

    /// Initial indexing finished: queries may be answered.
    pub fn ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn indexing_active(&self) -> bool {
        self.in_flight.load(Ordering::Relaxed) > 0 || self.queued.load(Ordering::Relaxed) > 0
    }

    pub fn approx_bytes(&self) -> usize {
        self.approx_bytes.load(Ordering::Relaxed)
    }

    pub fn build_duration_ms(&self) -> u64 {
        self.build_duration_ms.load(Ordering::Relaxed)
    }

    fn settle(&self, walk_started: Instant) {
        // Readiness: the initial walk enqueued everything and the queue
        // has drained at least that much work.
        if self.walk_done.load(Ordering::Acquire)
            && !self.ready.load(Ordering::Acquire)
            && self.queued.load(Ordering::Relaxed) == 0
            && self.in_flight.load(Ordering::Relaxed) == 0
        {
            self.build_duration_ms
                .store(walk_started.elapsed().as_millis() as u64, Ordering::Relaxed);
            self.ready.store(true, Ordering::Release);
        }
    }
}

struct SchedulerInner {
    coordinator: Arc<IndexCoordinator>,
    settings: Arc<Settings>,
    filter: Arc<PathFilter>,
    registry: Arc<ParserRegistry>,
    progress: Arc<Progress>,
    walk_started: Mutex<Instant>,
    eviction_gate: Mutex<()>,
}

pub struct IndexScheduler {
    tx: Sender<Job>,
    inner: Arc<SchedulerInner>,
}

impl IndexScheduler {
    /// Start the worker pool. Workers run until the scheduler is dropped.
    pub fn start(
        coordinator: Arc<IndexCoordinator>,
        settings: Arc<Settings>,
        filter: Arc<PathFilter>,
        registry: Arc<ParserRegistry>,
    ) -> Self {
        let worker_count = settings.effective_workers();
        let (tx, rx) = bounded::<Job>(worker_count * 64);

        let inner = Arc::new(SchedulerInner {
            coordinator,
            settings,
            filter,
            registry,
            progress: Arc::new(Progress::default()),
            walk_started: Mutex::new(Instant::now()),
            eviction_gate: Mutex::new(()),
        });

        for worker_id in 0..worker_count {
            let rx: Receiver<Job> = rx.clone();
            let inner = Arc::clone(&inner);
            if let Err(e) = std::thread::Builder::new()
                .name(format!("lci-worker-{worker_id}"))
                .spawn(move || worker_loop(&rx, &inner))
            {
                tracing::error!("[scheduler] failed to spawn worker {worker_id}: {e}");
            }
        }

        Self { tx, inner }
    }

    pub fn progress(&self) -> Arc<Progress> {
        Arc::clone(&self.inner.progress)
    }

    pub fn coordinator(&self) -> &Arc<IndexCoordinator> {
        &self.inner.coordinator
    }

    /// Queue one path, blocking when the queue is full (walker
    /// backpressure). Returns false when the path was deferred instead.
    pub fn enqueue(&self, path: PathBuf) -> bool {
        if self.inner.progress.over_ceiling.load(Ordering::Relaxed) {
            self.inner.progress.deferred.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.inner.progress.queued.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(Job::Index(path)).is_err() {
            self.inner.progress.queued.fetch_sub(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    /// Non-blocking enqueue for the watcher path.
    pub fn try_enqueue(&self, path: PathBuf) -> bool {
        if self.inner.progress.over_ceiling.load(Ordering::Relaxed) {
            self.inner.progress.deferred.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.inner.progress.queued.fetch_add(1, Ordering::Relaxed);
        if self.tx.try_send(Job::Index(path)).is_err() {
            self.inner.progress.queued.fetch_sub(1, Ordering::Relaxed);
            self.inner.progress.deferred.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    /// Queue a removal. Removals are never deferred.
    pub fn enqueue_remove(&self, path: PathBuf) {
        self.inner.progress.queued.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(Job::Remove(path)).is_err() {
            self.inner.progress.queued.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Walk the project tree and queue every indexable file. Called once
    /// at startup; `/reindex` without a path runs it again.
    pub fn walk_project(&self) {
        let inner = &self.inner;
        *inner.walk_started.lock() = Instant::now();
        inner.progress.walk_done.store(false, Ordering::Release);
        inner.progress.ready.store(false, Ordering::Release);

        let mut enqueued = 0usize;
        for path in walk_files(&inner.settings, &inner.filter) {
            if self.enqueue(path) {
                enqueued += 1;
            }
            if enqueued >= inner.settings.indexing.max_file_count {
                tracing::warn!(
                    "[scheduler] file count cap {} reached, rest of tree skipped",
                    inner.settings.indexing.max_file_count
                );
                break;
            }
        }

        inner.progress.walk_total.store(enqueued, Ordering::Release);
        inner.progress.walk_done.store(true, Ordering::Release);
        // The workers may have drained everything already; settle here so
        // readiness is not left waiting for a job that never comes.
        inner.progress.settle(*inner.walk_started.lock());
        crate::log_event!("scheduler", "walk complete", "{enqueued} files queued");
    }

    /// Walk one subtree (new directory detected by the watcher).
    pub fn walk_subtree(&self, root: &Path) {
        for path in walk_files_under(root, &self.inner.settings, &self.inner.filter) {
            self.try_enqueue(path);
        }
    }

}

// Dropping the scheduler drops the only sender; workers drain whatever is
// left in the queue and exit on the closed channel.

/// Files under the project root that pass the filter.
fn walk_files(settings: &Settings, filter: &PathFilter) -> Vec<PathBuf> {
    walk_files_under(&settings.project_root, settings, filter)
}

fn walk_files_under(root: &Path, settings: &Settings, filter: &PathFilter) -> Vec<PathBuf> {
    let mut builder = ignore::WalkBuilder::new(root);
    builder
        .hidden(true)
        .git_ignore(settings.indexing.use_gitignore)
        .git_global(false)
        .git_exclude(settings.indexing.use_gitignore)
        .follow_links(settings.indexing.follow_symlinks)
        .require_git(false);

    builder
        .build()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .map(|entry| entry.into_path())
        .filter(|path| filter.should_index(path, false))
        .filter(|path| Language::from_path(path).is_some())
        .collect()
}

fn worker_loop(rx: &Receiver<Job>, inner: &SchedulerInner) {
    while let Ok(job) = rx.recv() {
        inner.progress.queued.fetch_sub(1, Ordering::Relaxed);
        inner.progress.in_flight.fetch_add(1, Ordering::Relaxed);
        match job {
            Job::Index(path) => process_index(inner, &path),
            Job::Remove(path) => process_remove(inner, &path),
        }
        inner.progress.in_flight.fetch_sub(1, Ordering::Relaxed);
        inner.progress.settle(*inner.walk_started.lock());
    }
}

fn lock_deadline(inner: &SchedulerInner) -> Duration {
    Duration::from_millis(inner.settings.limits.lock_timeout_ms)
}

/// Relative, forward-slash-normalized form of an absolute path.
fn relative_path(inner: &SchedulerInner, path: &Path) -> IndexResult<String> {
    let relative = path
        .strip_prefix(&inner.settings.project_root)
        .map_err(|_| IndexError::PathDenied {
            path: path.to_path_buf(),
            reason: "outside project root",
        })?;
    Ok(crate::index::normalize_path(&relative.to_string_lossy()))
}

fn process_index(inner: &SchedulerInner, path: &Path) {
    match index_one(inner, path) {
        Ok(IndexOutcome::Committed) => {
            inner.progress.completed.fetch_add(1, Ordering::Relaxed);
            maybe_check_memory(inner);
        }
        Ok(IndexOutcome::Skipped(reason)) => {
            inner.progress.skipped.fetch_add(1, Ordering::Relaxed);
            crate::debug_event!("scheduler", "skipped", "{}: {reason}", path.display());
        }
        Ok(IndexOutcome::Gone) => {
            // The file disappeared between event and claim; treat as a
            // removal so stale contributions cannot linger.
            process_remove_counted(inner, path, false);
            inner.progress.completed.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) if e.is_per_file() => {
            inner.progress.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("[scheduler] {}: {e}", path.display());
        }
        Err(e) => {
            inner.progress.failed.fetch_add(1, Ordering::Relaxed);
            inner.coordinator.record_failure(IndexKind::Symbols);
            tracing::error!("[scheduler] {}: {e}", path.display());
        }
    }
}

enum IndexOutcome {
    Committed,
    Skipped(&'static str),
    Gone,
}

fn index_one(inner: &SchedulerInner, path: &Path) -> IndexResult<IndexOutcome> {
    let started = Instant::now();
    let parse_ceiling = Duration::from_secs(inner.settings.indexing.parse_timeout_secs);

    // Global build deadline: once the walk's budget is spent, the files
    // still queued fail fast instead of dragging the build out.
    if !inner.progress.ready.load(Ordering::Acquire) {
        let build_elapsed = inner.walk_started.lock().elapsed();
        let build_budget = Duration::from_secs(inner.settings.indexing.index_timeout_secs);
        if build_elapsed > build_budget {
            return Err(IndexError::Timeout {
                what: "overall indexing",
                waited_ms: build_elapsed.as_millis() as u64,
            });
        }
    }

    if !inner.filter.should_index(path, false) {
        return Err(IndexError::PathDenied {
            path: path.to_path_buf(),
            reason: "filtered",
        });
    }
    let relative = relative_path(inner, path)?;
    let Some(language) = Language::from_path(path) else {
        return Ok(IndexOutcome::Skipped("unsupported file type"));
    };

    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(IndexOutcome::Gone),
        Err(e) => {
            return Err(IndexError::IoFailure {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };
    if metadata.len() > inner.settings.indexing.max_file_size {
        return Ok(IndexOutcome::Skipped("exceeds max file size"));
    }

    let file_id = inner
        .coordinator
        .register_file(&relative, lock_deadline(inner))?;
    inner.coordinator.set_file_state(
        file_id,
        FileState::Parsing,
        None,
        lock_deadline(inner),
    )?;

    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(IndexOutcome::Gone),
        Err(e) => {
            let error = IndexError::IoFailure {
                path: path.to_path_buf(),
                source: e,
            };
            record_failure(inner, file_id, &relative, language, &metadata, &error);
            return Err(error);
        }
    };

    let output = inner.registry.get(language).parse(language, path, &bytes);
    if !output.diagnostics.is_empty() {
        crate::debug_event!(
            "scheduler",
            "diagnostics",
            "{}: {}",
            relative,
            output.diagnostics[0].message
        );
    }

    // The parse runs on this thread and cannot be preempted; the ceiling
    // is enforced at the stage boundary.
    if started.elapsed() > parse_ceiling {
        let error = IndexError::Timeout {
            what: "per-file parse",
            waited_ms: started.elapsed().as_millis() as u64,
        };
        record_failure(inner, file_id, &relative, language, &metadata, &error);
        return Err(error);
    }

    let delta = FileDelta {
        entry: FileEntry {
            id: file_id,
            path: relative.clone().into(),
            size: metadata.len(),
            mtime: metadata.modified().ok(),
            language,
            state: FileState::Parsing,
            last_error: None,
            last_touched: Instant::now(),
            symbol_count: 0,
            shingle_count: 0,
        },
        symbols: output.symbols,
        references: output.references,
        shingles: output.shingles,
    };

    match inner.coordinator.commit_file(delta, lock_deadline(inner)) {
        Ok(()) => Ok(IndexOutcome::Committed),
        Err(error) => {
            record_failure(inner, file_id, &relative, language, &metadata, &error);
            Err(error)
        }
    }
}

fn record_failure(
    inner: &SchedulerInner,
    file_id: FileId,
    relative: &str,
    language: Language,
    metadata: &std::fs::Metadata,
    error: &IndexError,
) {
    let stub = FileEntry {
        id: file_id,
        path: relative.into(),
        size: metadata.len(),
        mtime: metadata.modified().ok(),
        language,
        state: FileState::Failed,
        last_error: None,
        last_touched: Instant::now(),
        symbol_count: 0,
        shingle_count: 0,
    };
    if let Err(e) =
        inner
            .coordinator
            .record_file_failure(stub, error.to_string(), lock_deadline(inner))
    {
        tracing::error!("[scheduler] failed to record failure for {relative}: {e}");
    }
}

fn process_remove(inner: &SchedulerInner, path: &Path) {
    process_remove_counted(inner, path, true);
}

fn process_remove_counted(inner: &SchedulerInner, path: &Path, count: bool) {
    let result: IndexResult<()> = (|| {
        let relative = relative_path(inner, path)?;
        let Some(file_id) = inner
            .coordinator
            .file_id_of(&relative, lock_deadline(inner))?
        else {
            return Ok(());
        };
        inner.coordinator.remove_file(file_id, lock_deadline(inner))
    })();

    match result {
        Ok(()) => {
            if count {
                inner.progress.removed.fetch_add(1, Ordering::Relaxed);
            }
        }
        Err(e) => {
            inner.progress.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("[scheduler] remove {}: {e}", path.display());
        }
    }
}

/// Recompute approximate memory every few commits; breach defers new
/// paths and triggers an eviction pass down to the low-water mark.
fn maybe_check_memory(inner: &SchedulerInner) {
    let completed = inner.progress.completed.load(Ordering::Relaxed);
    if completed % MEMORY_CHECK_INTERVAL != 0 {
        return;
    }
    let Ok(bytes) = inner.coordinator.approximate_bytes(lock_deadline(inner)) else {
        return;
    };
    inner.progress.approx_bytes.store(bytes, Ordering::Relaxed);

    let ceiling = inner.settings.limits.memory_ceiling_bytes;
    if bytes <= ceiling {
        inner.progress.over_ceiling.store(false, Ordering::Relaxed);
        return;
    }
    inner.progress.over_ceiling.store(true, Ordering::Relaxed);

    // One evictor at a time; the others go back to indexing.
    let Some(_gate) = inner.eviction_gate.try_lock() else {
        return;
    };
    let low_water = (ceiling as f64 * LOW_WATER_RATIO) as usize;
    let mut current = bytes;

    let victims: Vec<FileId> = {
        let Ok(view) = inner.coordinator.acquire_read(
            crate::index::Requirements::new().with(IndexKind::Locations),
            lock_deadline(inner),
        ) else {
            return;
        };
        view.locations()
            .map(|l| l.eviction_order())
            .unwrap_or_default()
    };

    let mut evicted = 0usize;
    for file_id in victims {
        if current <= low_water {
            break;
        }
        if inner
            .coordinator
            .remove_file(file_id, lock_deadline(inner))
            .is_err()
        {
            break;
        }
        evicted += 1;
        if evicted % 8 == 0 {
            if let Ok(bytes) = inner.coordinator.approximate_bytes(lock_deadline(inner)) {
                current = bytes;
            }
        }
    }
    if evicted > 0 {
        crate::log_event!("scheduler", "evicted", "{evicted} entries to relieve memory");
        if let Ok(bytes) = inner.coordinator.approximate_bytes(lock_deadline(inner)) {
            inner.progress.approx_bytes.store(bytes, Ordering::Relaxed);
            inner
                .progress
                .over_ceiling
                .store(bytes > ceiling, Ordering::Relaxed);
        }
    }
}
