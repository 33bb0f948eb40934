//! Index coordinator: per-index-type read/write locks, the search
//! requirements builder, and the atomic per-file commit.
//!
//! State is partitioned into five named index types. Every acquisition
//! walks the canonical global order (trigram, symbols, references,
//! locations, postings) so lock sets can never deadlock, and every
//! acquisition carries a deadline. parking_lot's fair queueing stops
//! admitting new readers once a writer waits, which bounds staleness
//! during bursty indexing.
//!
//! A file commit prepares its delta off to the side, then updates all
//! affected indexes inside a single all-write critical section, removing
//! the old entry's contributions in the same breath. Readers therefore see
//! either the whole pre-commit view or the whole post-commit view, never a
//! mixture.

use crate::error::{IndexError, IndexResult};
use crate::index::locations::{FileEntry, FileState, LocationIndex};
use crate::index::postings::PostingTracker;
use crate::index::references::ReferenceIndex;
use crate::index::symbols::SymbolStore;
use crate::index::trigram::TrigramIndex;
use crate::parsing::{ParsedReference, ParsedSymbol};
use crate::types::{FileId, Reference, Shingle, SourceLocation};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// The five named index types, in canonical lock order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Trigram,
    Symbols,
    References,
    Locations,
    Postings,
}

impl IndexKind {
    pub const ALL: [IndexKind; 5] = [
        IndexKind::Trigram,
        IndexKind::Symbols,
        IndexKind::References,
        IndexKind::Locations,
        IndexKind::Postings,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Trigram => "trigram",
            Self::Symbols => "symbols",
            Self::References => "references",
            Self::Locations => "locations",
            Self::Postings => "postings",
        }
    }

    /// Transitive requirements, declared once and resolved by the builder.
    fn dependencies(&self) -> &'static [IndexKind] {
        match self {
            // Reference records resolve through the symbol tables.
            Self::References => &[IndexKind::Symbols],
            // Trigram candidates are only useful with their reverse map.
            Self::Trigram => &[IndexKind::Postings],
            _ => &[],
        }
    }
}

/// Which index types a query needs. Built once per query plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Requirements {
    needs: [bool; 5],
}

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require an index type plus its transitive dependencies.
    pub fn with(mut self, kind: IndexKind) -> Self {
        self.mark(kind);
        self
    }

    fn mark(&mut self, kind: IndexKind) {
        if !self.needs[kind as usize] {
            self.needs[kind as usize] = true;
            for &dep in kind.dependencies() {
                self.mark(dep);
            }
        }
    }

    pub fn all() -> Self {
        let mut req = Self::new();
        for kind in IndexKind::ALL {
            req.needs[kind as usize] = true;
        }
        req
    }

    pub fn needs(&self, kind: IndexKind) -> bool {
        self.needs[kind as usize]
    }
}

/// A per-index-type warning attached to degraded responses.
#[derive(Debug, Clone, Serialize)]
pub struct IndexWarning {
    pub index: IndexKind,
    pub reason: String,
}

#[derive(Debug, Default)]
struct HealthBook {
    failures: HashMap<IndexKind, u32>,
    forced: HashSet<IndexKind>,
}

/// Everything one file contributes to the indexes, prepared off to the
/// side before the commit's critical section.
#[derive(Debug)]
pub struct FileDelta {
    pub entry: FileEntry,
    pub symbols: Vec<ParsedSymbol>,
    pub references: Vec<ParsedReference>,
    pub shingles: Vec<Shingle>,
}

/// Consistent read snapshot over the requested index types.
///
/// An accessor returns `None` when its index was skipped as unhealthy (the
/// degraded path) or simply not requested.
pub struct ReadView<'a> {
    trigram: Option<RwLockReadGuard<'a, TrigramIndex>>,
    symbols: Option<RwLockReadGuard<'a, SymbolStore>>,
    references: Option<RwLockReadGuard<'a, ReferenceIndex>>,
    locations: Option<RwLockReadGuard<'a, LocationIndex>>,
    postings: Option<RwLockReadGuard<'a, PostingTracker>>,
    warnings: Vec<IndexWarning>,
}

impl ReadView<'_> {
    pub fn trigram(&self) -> Option<&TrigramIndex> {
        self.trigram.as_deref()
    }
    pub fn symbols(&self) -> Option<&SymbolStore> {
        self.symbols.as_deref()
    }
    pub fn references(&self) -> Option<&ReferenceIndex> {
        self.references.as_deref()
    }
    pub fn locations(&self) -> Option<&LocationIndex> {
        self.locations.as_deref()
    }
    pub fn postings(&self) -> Option<&PostingTracker> {
        self.postings.as_deref()
    }

    pub fn degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn warnings(&self) -> &[IndexWarning] {
        &self.warnings
    }
}

pub struct IndexCoordinator {
    trigram: RwLock<TrigramIndex>,
    symbols: RwLock<SymbolStore>,
    references: RwLock<ReferenceIndex>,
    locations: RwLock<LocationIndex>,
    postings: RwLock<PostingTracker>,
    health: Mutex<HealthBook>,
    unhealthy_threshold: u32,
}

impl IndexCoordinator {
    pub fn new(unhealthy_threshold: u32) -> Self {
        Self {
            trigram: RwLock::new(TrigramIndex::new()),
            symbols: RwLock::new(SymbolStore::new()),
            references: RwLock::new(ReferenceIndex::new()),
            locations: RwLock::new(LocationIndex::new()),
            postings: RwLock::new(PostingTracker::new()),
            health: Mutex::new(HealthBook::default()),
            unhealthy_threshold,
        }
    }

    /// Acquire read guards for the requested index types, skipping (and
    /// warning about) unhealthy ones. Locks are taken in canonical order;
    /// the whole set shares one deadline.
    pub fn acquire_read(&self, req: Requirements, deadline: Duration) -> IndexResult<ReadView<'_>> {
        let started = Instant::now();
        let mut view = ReadView {
            trigram: None,
            symbols: None,
            references: None,
            locations: None,
            postings: None,
            warnings: Vec::new(),
        };

        for kind in IndexKind::ALL {
            if !req.needs(kind) {
                continue;
            }
            if let Some(reason) = self.unhealthy_reason(kind) {
                view.warnings.push(IndexWarning { index: kind, reason });
                continue;
            }
            let remaining = remaining(deadline, started, kind)?;
            match kind {
                IndexKind::Trigram => {
                    view.trigram = Some(try_read(&self.trigram, remaining, kind)?);
                }
                IndexKind::Symbols => {
                    view.symbols = Some(try_read(&self.symbols, remaining, kind)?);
                }
                IndexKind::References => {
                    view.references = Some(try_read(&self.references, remaining, kind)?);
                }
                IndexKind::Locations => {
                    view.locations = Some(try_read(&self.locations, remaining, kind)?);
                }
                IndexKind::Postings => {
                    view.postings = Some(try_read(&self.postings, remaining, kind)?);
                }
            }
        }
        Ok(view)
    }

    /// Commit a file's delta as a single atomic swap across all indexes.
    ///
    /// Write locks for every index type are taken in canonical order; the
    /// previous entry's contributions are removed in the same critical
    /// section that publishes the new ones.
    pub fn commit_file(&self, delta: FileDelta, deadline: Duration) -> IndexResult<()> {
        let FileDelta {
            mut entry,
            symbols,
            references,
            shingles,
        } = delta;
        let file_id = entry.id;

        let mut guards = self.acquire_write_all(deadline)?;

        let old_shingles = guards.postings.replace(file_id, shingles.clone());
        guards.trigram.remove(file_id, &old_shingles);
        guards.trigram.add(file_id, &shingles);

        guards.symbols.commit(file_id, symbols)?;

        let resolved = resolve_references(&guards.symbols, file_id, references);
        guards.references.commit(file_id, resolved);

        entry.symbol_count = guards.symbols.symbols_in(file_id).count();
        entry.shingle_count = shingles.len();
        entry.state = FileState::Committed;
        entry.last_error = None;
        guards.locations.commit(entry);

        self.mark_success();
        Ok(())
    }

    /// Remove every contribution of a file (deletion or eviction).
    pub fn remove_file(&self, file_id: FileId, deadline: Duration) -> IndexResult<()> {
        let mut guards = self.acquire_write_all(deadline)?;

        let old_shingles = guards.postings.remove(file_id);
        guards.trigram.remove(file_id, &old_shingles);
        guards.symbols.remove_file(file_id);
        guards.references.remove_file(file_id);
        guards.locations.remove(file_id);
        Ok(())
    }

    /// Register a path, allocating its id if new. Serialized through the
    /// symbols write lock, so concurrent registrations of one path agree.
    pub fn register_file(&self, path: &str, deadline: Duration) -> IndexResult<FileId> {
        let mut symbols = try_write(&self.symbols, deadline, IndexKind::Symbols)?;
        symbols.register_file(path)
    }

    /// Already-registered id for a path, if any.
    pub fn file_id_of(&self, path: &str, deadline: Duration) -> IndexResult<Option<FileId>> {
        let symbols = try_read(&self.symbols, deadline, IndexKind::Symbols)?;
        Ok(symbols.file_id(path))
    }

    /// Record a failure on a file, creating a stub entry when the file
    /// never committed. A previously committed entry keeps its content;
    /// only its state and error change.
    pub fn record_file_failure(
        &self,
        stub: FileEntry,
        error: String,
        deadline: Duration,
    ) -> IndexResult<()> {
        let mut locations = try_write(&self.locations, deadline, IndexKind::Locations)?;
        if locations.get(stub.id).is_some() {
            locations.set_state(stub.id, FileState::Failed, Some(error));
        } else {
            let mut stub = stub;
            stub.state = FileState::Failed;
            stub.last_error = Some(error.into());
            locations.commit(stub);
        }
        Ok(())
    }

    /// Record per-file bookkeeping outside a commit (queue/parse states).
    pub fn set_file_state(
        &self,
        file_id: FileId,
        state: FileState,
        error: Option<String>,
        deadline: Duration,
    ) -> IndexResult<()> {
        let mut locations = try_write(&self.locations, deadline, IndexKind::Locations)?;
        locations.set_state(file_id, state, error);
        Ok(())
    }

    /// Approximate total heap held by the five indexes.
    pub fn approximate_bytes(&self, deadline: Duration) -> IndexResult<usize> {
        let view = self.acquire_read(Requirements::all(), deadline)?;
        Ok(view.trigram().map_or(0, |t| t.approximate_bytes())
            + view.symbols().map_or(0, |s| s.approximate_bytes())
            + view.references().map_or(0, |r| r.approximate_bytes())
            + view.locations().map_or(0, |l| l.approximate_bytes())
            + view.postings().map_or(0, |p| p.approximate_bytes()))
    }

    /// Record a failure against an index type; past the threshold the
    /// index is reported unhealthy and reads degrade around it.
    pub fn record_failure(&self, kind: IndexKind) {
        let mut health = self.health.lock();
        *health.failures.entry(kind).or_insert(0) += 1;
    }

    fn mark_success(&self) {
        let mut health = self.health.lock();
        health.failures.clear();
    }

    /// Explicit fault injection for degraded-path testing.
    pub fn force_unhealthy(&self, kind: IndexKind, unhealthy: bool) {
        let mut health = self.health.lock();
        if unhealthy {
            health.forced.insert(kind);
        } else {
            health.forced.remove(&kind);
        }
    }

    fn unhealthy_reason(&self, kind: IndexKind) -> Option<String> {
        let health = self.health.lock();
        if health.forced.contains(&kind) {
            return Some(format!("{} index marked unhealthy", kind.name()));
        }
        match health.failures.get(&kind) {
            Some(&count) if count >= self.unhealthy_threshold => Some(format!(
                "{} index unhealthy after {count} consecutive failures",
                kind.name()
            )),
            _ => None,
        }
    }

    fn acquire_write_all(&self, deadline: Duration) -> IndexResult<WriteAll<'_>> {
        let started = Instant::now();
        // Canonical order, one shared deadline.
        let trigram = try_write(
            &self.trigram,
            remaining(deadline, started, IndexKind::Trigram)?,
            IndexKind::Trigram,
        )?;
        let symbols = try_write(
            &self.symbols,
            remaining(deadline, started, IndexKind::Symbols)?,
            IndexKind::Symbols,
        )?;
        let references = try_write(
            &self.references,
            remaining(deadline, started, IndexKind::References)?,
            IndexKind::References,
        )?;
        let locations = try_write(
            &self.locations,
            remaining(deadline, started, IndexKind::Locations)?,
            IndexKind::Locations,
        )?;
        let postings = try_write(
            &self.postings,
            remaining(deadline, started, IndexKind::Postings)?,
            IndexKind::Postings,
        )?;
        Ok(WriteAll {
            trigram,
            symbols,
            references,
            locations,
            postings,
        })
    }
}

struct WriteAll<'a> {
    trigram: RwLockWriteGuard<'a, TrigramIndex>,
    symbols: RwLockWriteGuard<'a, SymbolStore>,
    references: RwLockWriteGuard<'a, ReferenceIndex>,
    locations: RwLockWriteGuard<'a, LocationIndex>,
    postings: RwLockWriteGuard<'a, PostingTracker>,
}

fn remaining(deadline: Duration, started: Instant, kind: IndexKind) -> IndexResult<Duration> {
    deadline
        .checked_sub(started.elapsed())
        .ok_or(IndexError::Timeout {
            what: kind.name(),
            waited_ms: deadline.as_millis() as u64,
        })
}

fn try_read<'a, T>(
    lock: &'a RwLock<T>,
    deadline: Duration,
    kind: IndexKind,
) -> IndexResult<RwLockReadGuard<'a, T>> {
    lock.try_read_for(deadline).ok_or(IndexError::Timeout {
        what: kind.name(),
        waited_ms: deadline.as_millis() as u64,
    })
}

fn try_write<'a, T>(
    lock: &'a RwLock<T>,
    deadline: Duration,
    kind: IndexKind,
) -> IndexResult<RwLockWriteGuard<'a, T>> {
    lock.try_write_for(deadline).ok_or(IndexError::Timeout {
        what: kind.name(),
        waited_ms: deadline.as_millis() as u64,
    })
}

/// Resolve parsed references against the just-committed symbol tables.
///
/// Internal references bind to a symbol of the same file; when the parser
/// guessed "internal" but nothing matches, the reference is reclassified
/// external so the non-external-implies-live invariant holds. External
/// references bind to any other file's symbol or stay dangling.
fn resolve_references(
    symbols: &SymbolStore,
    file_id: FileId,
    references: Vec<ParsedReference>,
) -> Vec<Reference> {
    references
        .into_iter()
        .map(|r| {
            let local = symbols
                .lookup_by_name(&r.name)
                .find(|id| id.file == file_id);
            let (symbol, is_external) = match local {
                Some(id) if !r.is_external => (Some(id), false),
                Some(id) => (Some(id), r.is_external),
                None => {
                    let foreign = symbols
                        .lookup_by_name(&r.name)
                        .find(|id| id.file != file_id);
                    (foreign, true)
                }
            };
            Reference {
                symbol,
                name: r.name,
                location: SourceLocation::new(file_id, r.line, r.column),
                is_external,
                import_path: r.import_path,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::shingle::shingles_of;
    use crate::parsing::Language;
    use crate::types::{ScopeKind, SymbolKind};

    const DEADLINE: Duration = Duration::from_secs(5);

    fn delta_for(
        coordinator: &IndexCoordinator,
        path: &str,
        symbol_names: &[&str],
        content: &str,
        reference_names: &[&str],
    ) -> FileDelta {
        let file_id = coordinator.register_file(path, DEADLINE).unwrap();
        FileDelta {
            entry: FileEntry {
                id: file_id,
                path: path.into(),
                size: content.len() as u64,
                mtime: None,
                language: Language::Rust,
                state: FileState::Parsing,
                last_error: None,
                last_touched: Instant::now(),
                symbol_count: 0,
                shingle_count: 0,
            },
            symbols: symbol_names
                .iter()
                .enumerate()
                .map(|(i, name)| ParsedSymbol {
                    name: (*name).into(),
                    kind: SymbolKind::Function,
                    scope: ScopeKind::Module,
                    line: (i + 1) as u32,
                    column: 0,
                    ..ParsedSymbol::default()
                })
                .collect(),
            references: reference_names
                .iter()
                .map(|name| ParsedReference {
                    name: (*name).into(),
                    line: 10,
                    column: 0,
                    is_external: !symbol_names.contains(name),
                    import_path: None,
                })
                .collect(),
            shingles: shingles_of(content),
        }
    }

    #[test]
    fn test_requirements_resolve_transitive_deps() {
        let req = Requirements::new().with(IndexKind::References);
        assert!(req.needs(IndexKind::References));
        assert!(req.needs(IndexKind::Symbols));
        assert!(!req.needs(IndexKind::Locations));

        let req = Requirements::new().with(IndexKind::Trigram);
        assert!(req.needs(IndexKind::Postings));
    }

    #[test]
    fn test_commit_publishes_all_indexes_together() {
        let coordinator = IndexCoordinator::new(5);
        let delta = delta_for(&coordinator, "a.rs", &["alpha_func"], "fn alpha_func()", &[]);
        let file_id = delta.entry.id;
        coordinator.commit_file(delta, DEADLINE).unwrap();

        let view = coordinator.acquire_read(Requirements::all(), DEADLINE).unwrap();
        let symbols = view.symbols().unwrap();
        assert_eq!(symbols.lookup_by_name("alpha_func").count(), 1);

        let candidates = view
            .trigram()
            .unwrap()
            .candidates(&shingles_of("alpha_func"));
        assert!(candidates.files.contains(&file_id));
        assert_eq!(view.locations().unwrap().get(file_id).unwrap().state, FileState::Committed);
    }

    #[test]
    fn test_recommit_removes_old_contributions() {
        let coordinator = IndexCoordinator::new(5);
        let delta = delta_for(&coordinator, "a.rs", &["old_name"], "fn old_name()", &[]);
        let file_id = delta.entry.id;
        coordinator.commit_file(delta, DEADLINE).unwrap();

        let delta = delta_for(&coordinator, "a.rs", &["new_name"], "fn new_name()", &[]);
        coordinator.commit_file(delta, DEADLINE).unwrap();

        let view = coordinator.acquire_read(Requirements::all(), DEADLINE).unwrap();
        assert_eq!(view.symbols().unwrap().lookup_by_name("old_name").count(), 0);
        let stale = view
            .trigram()
            .unwrap()
            .candidates(&shingles_of("old_name"));
        assert!(!stale.files.contains(&file_id));
    }

    #[test]
    fn test_trigram_postings_invariant() {
        let coordinator = IndexCoordinator::new(5);
        let delta = delta_for(&coordinator, "a.rs", &[], "some indexed content", &[]);
        let file_id = delta.entry.id;
        coordinator.commit_file(delta, DEADLINE).unwrap();

        let view = coordinator.acquire_read(Requirements::all(), DEADLINE).unwrap();
        let postings = view.postings().unwrap();
        let trigram = view.trigram().unwrap();

        // Forward: every recorded shingle has the file in its posting.
        for shingle in postings.get(file_id) {
            assert!(trigram.posting(shingle).unwrap().contains(&file_id));
        }
    }

    #[test]
    fn test_cross_file_reference_resolution() {
        let coordinator = IndexCoordinator::new(5);
        let target = delta_for(&coordinator, "lib.rs", &["shared_fn"], "fn shared_fn()", &[]);
        coordinator.commit_file(target, DEADLINE).unwrap();

        let caller = delta_for(
            &coordinator,
            "main.rs",
            &["main"],
            "fn main() { shared_fn() }",
            &["shared_fn"],
        );
        coordinator.commit_file(caller, DEADLINE).unwrap();

        let view = coordinator
            .acquire_read(Requirements::new().with(IndexKind::References), DEADLINE)
            .unwrap();
        let symbols = view.symbols().unwrap();
        let target_id = symbols.lookup_by_name("shared_fn").next().unwrap();
        let incoming: Vec<_> = view.references().unwrap().references_to(target_id).collect();
        assert_eq!(incoming.len(), 1);
        assert!(incoming[0].is_external);
    }

    #[test]
    fn test_dangling_external_reference() {
        let coordinator = IndexCoordinator::new(5);
        let caller = delta_for(
            &coordinator,
            "main.rs",
            &["main"],
            "fn main() { missing() }",
            &["missing"],
        );
        let file_id = caller.entry.id;
        coordinator.commit_file(caller, DEADLINE).unwrap();

        let view = coordinator
            .acquire_read(Requirements::new().with(IndexKind::References), DEADLINE)
            .unwrap();
        let outgoing: Vec<_> = view
            .references()
            .unwrap()
            .references_from(file_id)
            .collect();
        assert_eq!(outgoing.len(), 1);
        assert!(outgoing[0].symbol.is_none());
        assert!(outgoing[0].is_external);
    }

    #[test]
    fn test_remove_file_unwinds_everything() {
        let coordinator = IndexCoordinator::new(5);
        let delta = delta_for(&coordinator, "a.rs", &["f"], "fn f() {}", &[]);
        let file_id = delta.entry.id;
        coordinator.commit_file(delta, DEADLINE).unwrap();
        coordinator.remove_file(file_id, DEADLINE).unwrap();

        let view = coordinator.acquire_read(Requirements::all(), DEADLINE).unwrap();
        assert_eq!(view.symbols().unwrap().lookup_by_name("f").count(), 0);
        assert!(view.locations().unwrap().get(file_id).is_none());
        assert_eq!(view.trigram().unwrap().shingle_count(), 0);
        assert!(view.postings().unwrap().get(file_id).is_empty());
    }

    #[test]
    fn test_degraded_read_skips_unhealthy_index() {
        let coordinator = IndexCoordinator::new(5);
        coordinator.force_unhealthy(IndexKind::Trigram, true);

        let view = coordinator
            .acquire_read(Requirements::new().with(IndexKind::Trigram), DEADLINE)
            .unwrap();
        assert!(view.degraded());
        assert!(view.trigram().is_none());
        assert_eq!(view.warnings()[0].index, IndexKind::Trigram);

        coordinator.force_unhealthy(IndexKind::Trigram, false);
        let view = coordinator
            .acquire_read(Requirements::new().with(IndexKind::Trigram), DEADLINE)
            .unwrap();
        assert!(!view.degraded());
    }

    #[test]
    fn test_failure_threshold_marks_unhealthy() {
        let coordinator = IndexCoordinator::new(2);
        coordinator.record_failure(IndexKind::Symbols);
        let view = coordinator
            .acquire_read(Requirements::new().with(IndexKind::Symbols), DEADLINE)
            .unwrap();
        assert!(!view.degraded(), "below threshold");

        coordinator.record_failure(IndexKind::Symbols);
        let view = coordinator
            .acquire_read(Requirements::new().with(IndexKind::Symbols), DEADLINE)
            .unwrap();
        assert!(view.degraded());
    }

    #[test]
    fn test_write_lock_blocks_readers_until_timeout() {
        use std::sync::Arc;

        let coordinator = Arc::new(IndexCoordinator::new(5));
        let delta = delta_for(&coordinator, "a.rs", &["f"], "fn f()", &[]);
        coordinator.commit_file(delta, DEADLINE).unwrap();

        let held = coordinator.symbols.write();
        let contender = Arc::clone(&coordinator);
        let handle = std::thread::spawn(move || {
            contender
                .acquire_read(
                    Requirements::new().with(IndexKind::Symbols),
                    Duration::from_millis(50),
                )
                .map(|_| ())
        });
        let result = handle.join().unwrap();
        drop(held);
        assert!(matches!(result, Err(IndexError::Timeout { .. })));
    }

    #[test]
    fn test_concurrent_reader_sees_whole_commit_or_none() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};

        let coordinator = Arc::new(IndexCoordinator::new(5));
        let stop = Arc::new(AtomicBool::new(false));

        let writer = {
            let coordinator = Arc::clone(&coordinator);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut toggle = false;
                while !stop.load(Ordering::Relaxed) {
                    let name = if toggle { "first_version" } else { "second_version" };
                    let delta = delta_for(
                        &coordinator,
                        "flip.rs",
                        &[name],
                        &format!("fn {name}()"),
                        &[],
                    );
                    coordinator.commit_file(delta, DEADLINE).unwrap();
                    toggle = !toggle;
                }
            })
        };

        for _ in 0..200 {
            let view = coordinator.acquire_read(Requirements::all(), DEADLINE).unwrap();
            let symbols = view.symbols().unwrap();
            let first = symbols.lookup_by_name("first_version").count();
            let second = symbols.lookup_by_name("second_version").count();
            // Exactly one version is visible once anything committed.
            assert!(first + second <= 1);
            if let Some(file_id) = symbols.file_id("flip.rs") {
                if first + second == 1 {
                    let entry = view.locations().unwrap().get(file_id).unwrap();
                    assert_eq!(entry.symbol_count, 1);
                }
            }
        }

        stop.store(true, Ordering::Relaxed);
        writer.join().unwrap();
    }
}
