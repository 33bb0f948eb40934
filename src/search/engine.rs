//! Query planner and executor.
//!
//! A query declares which index types it needs, acquires one consistent
//! read set through the coordinator, narrows candidates through the
//! trigram index, verifies hits against symbol names (and re-read file
//! content for non-symbol matches), then ranks and cuts.

use crate::config::Settings;
use crate::error::{IndexError, IndexResult};
use crate::index::{
    FileEntry, FileState, IndexCoordinator, IndexKind, IndexWarning, ReadView, Requirements,
};
use crate::parsing::shingle::shingles_of_pattern;
use crate::search::score::{self, MatchLayer};
use crate::types::{CompositeSymbolId, FileId, SymbolKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Caller-tunable search behavior. Unknown fields are ignored on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    /// Suppress non-symbol (content) hits entirely.
    pub require_symbol: bool,
    /// Restrict hits to these symbol kinds.
    pub kinds: Option<Vec<SymbolKind>>,
    /// Restrict hits to paths under this prefix.
    pub path_prefix: Option<String>,
    /// Hits scoring below this are discarded.
    pub min_score: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            require_symbol: false,
            kinds: None,
            path_prefix: None,
            min_score: 0.0,
        }
    }
}

pub const DEFAULT_MAX_RESULTS: usize = 50;

/// One ranked result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// Compact composite id; absent for content hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<SymbolKind>,
    pub path: String,
    pub line: u32,
    pub column: u16,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<MatchLayer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<IndexWarning>,
}

/// Full record for `/symbol` lookups.
#[derive(Debug, Serialize)]
pub struct SymbolInfo {
    pub id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub scope: crate::types::ScopeKind,
    pub path: String,
    pub line: u32,
    pub column: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<crate::types::AnnotationSet>,
}

/// Per-endpoint hit counters surfaced by `/stats`.
#[derive(Debug, Default)]
pub struct SearchCounters {
    pub searches: AtomicU64,
    pub definitions: AtomicU64,
    pub references: AtomicU64,
    pub trees: AtomicU64,
    pub symbol_lookups: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct CountersSnapshot {
    pub searches: u64,
    pub definitions: u64,
    pub references: u64,
    pub trees: u64,
    pub symbol_lookups: u64,
}

impl SearchCounters {
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            searches: self.searches.load(Ordering::Relaxed),
            definitions: self.definitions.load(Ordering::Relaxed),
            references: self.references.load(Ordering::Relaxed),
            trees: self.trees.load(Ordering::Relaxed),
            symbol_lookups: self.symbol_lookups.load(Ordering::Relaxed),
        }
    }
}

pub struct SearchEngine {
    coordinator: Arc<IndexCoordinator>,
    settings: Arc<Settings>,
    counters: SearchCounters,
}

impl SearchEngine {
    pub fn new(coordinator: Arc<IndexCoordinator>, settings: Arc<Settings>) -> Self {
        Self {
            coordinator,
            settings,
            counters: SearchCounters::default(),
        }
    }

    pub fn coordinator(&self) -> &Arc<IndexCoordinator> {
        &self.coordinator
    }

    pub fn counters(&self) -> &SearchCounters {
        &self.counters
    }

    pub(crate) fn lock_deadline(&self) -> Duration {
        Duration::from_millis(self.settings.limits.lock_timeout_ms)
    }

    /// Textual pattern search over symbols and content.
    pub fn search(
        &self,
        pattern: &str,
        options: &SearchOptions,
        max_results: usize,
    ) -> IndexResult<SearchResponse> {
        self.counters.searches.fetch_add(1, Ordering::Relaxed);

        let req = Requirements::new()
            .with(IndexKind::Trigram)
            .with(IndexKind::Symbols)
            .with(IndexKind::Locations);
        let view = self.coordinator.acquire_read(req, self.lock_deadline())?;

        let mut hits = self.collect_hits(&view, pattern, options)?;
        finish(&mut hits, options.min_score, max_results);

        Ok(SearchResponse {
            results: hits,
            degraded: view.degraded(),
            warnings: view.warnings().to_vec(),
        })
    }

    /// Search restricted to declaration sites.
    pub fn definition(&self, pattern: &str, max_results: usize) -> IndexResult<SearchResponse> {
        self.counters.definitions.fetch_add(1, Ordering::Relaxed);

        let options = SearchOptions {
            require_symbol: true,
            kinds: Some(vec![
                SymbolKind::Function,
                SymbolKind::Class,
                SymbolKind::Struct,
                SymbolKind::Interface,
                SymbolKind::Type,
                SymbolKind::Method,
            ]),
            ..SearchOptions::default()
        };

        let req = Requirements::new()
            .with(IndexKind::Trigram)
            .with(IndexKind::Symbols)
            .with(IndexKind::Locations);
        let view = self.coordinator.acquire_read(req, self.lock_deadline())?;

        let mut hits = self.collect_hits(&view, pattern, &options)?;
        finish(&mut hits, options.min_score, max_results);

        Ok(SearchResponse {
            results: hits,
            degraded: view.degraded(),
            warnings: view.warnings().to_vec(),
        })
    }

    /// Non-declaration hits: the locations that reference symbols matching
    /// the pattern.
    pub fn references(&self, pattern: &str, max_results: usize) -> IndexResult<SearchResponse> {
        self.counters.references.fetch_add(1, Ordering::Relaxed);

        let req = Requirements::new()
            .with(IndexKind::References)
            .with(IndexKind::Locations);
        let view = self.coordinator.acquire_read(req, self.lock_deadline())?;

        let mut hits = Vec::new();
        if let (Some(symbols), Some(references)) = (view.symbols(), view.references()) {
            for target in matching_symbols(&view, pattern, &self.settings.scoring) {
                let Some(record) = symbols.resolve(target.id) else {
                    continue;
                };
                for reference in references.references_to(target.id) {
                    let Some(entry) = view
                        .locations()
                        .and_then(|l| l.get(reference.location.file_id))
                    else {
                        continue;
                    };
                    let adjustment = score::ranking_adjustment(
                        entry.language.category(),
                        true,
                        &self.settings.ranking,
                    );
                    hits.push(SearchHit {
                        id: Some(target.id.compact()),
                        name: record.name.to_string(),
                        kind: Some(record.kind),
                        path: entry.path.to_string(),
                        line: reference.location.line,
                        column: reference.location.column,
                        score: target.score + adjustment,
                        layer: Some(target.layer),
                        signature: None,
                        doc: None,
                    });
                }
            }

            // References committed before their target file dangle with no
            // resolved id; re-resolve them by name at query time so answers
            // do not depend on commit order.
            for reference in references.iter_outgoing() {
                if reference.symbol.is_some() {
                    continue;
                }
                let Some((base, layer)) = score::score_name(
                    pattern,
                    &reference.name,
                    None,
                    &self.settings.scoring,
                    false,
                ) else {
                    continue;
                };
                if !matches!(layer, MatchLayer::Exact | MatchLayer::Substring) {
                    continue;
                }
                let Some(entry) = view
                    .locations()
                    .and_then(|l| l.get(reference.location.file_id))
                else {
                    continue;
                };
                let resolved_now = symbols.lookup_by_name(&reference.name).next();
                let adjustment = score::ranking_adjustment(
                    entry.language.category(),
                    true,
                    &self.settings.ranking,
                );
                hits.push(SearchHit {
                    id: resolved_now.map(|id| id.compact()),
                    name: reference.name.to_string(),
                    kind: None,
                    path: entry.path.to_string(),
                    line: reference.location.line,
                    column: reference.location.column,
                    score: base + adjustment,
                    layer: Some(layer),
                    signature: None,
                    doc: None,
                });
            }
        }
        finish(&mut hits, 0.0, max_results);

        Ok(SearchResponse {
            results: hits,
            degraded: view.degraded(),
            warnings: view.warnings().to_vec(),
        })
    }

    /// Resolve one compact composite id.
    pub fn resolve_symbol(&self, compact: &str) -> IndexResult<Option<SymbolInfo>> {
        self.counters.symbol_lookups.fetch_add(1, Ordering::Relaxed);

        let id = CompositeSymbolId::parse_compact(compact).map_err(|source| {
            IndexError::InvalidId {
                input: compact.to_string(),
                source,
            }
        })?;
        let Some(id) = id else {
            return Ok(None);
        };

        let req = Requirements::new()
            .with(IndexKind::Symbols)
            .with(IndexKind::Locations);
        let view = self.coordinator.acquire_read(req, self.lock_deadline())?;

        let Some(symbols) = view.symbols() else {
            return Ok(None);
        };
        let Some(record) = symbols.resolve(id) else {
            return Ok(None);
        };
        let path = view
            .locations()
            .and_then(|l| l.get(id.file))
            .map(|e| e.path.to_string())
            .or_else(|| symbols.path_of(id.file).map(str::to_string))
            .unwrap_or_default();

        Ok(Some(SymbolInfo {
            id: record.id.compact(),
            name: record.name.to_string(),
            kind: record.kind,
            scope: record.scope,
            path,
            line: record.location.line,
            column: record.location.column,
            signature: record.signature.as_deref().map(str::to_string),
            doc: record.doc.as_deref().map(str::to_string),
            annotations: record.annotations.clone(),
        }))
    }

    fn collect_hits(
        &self,
        view: &ReadView<'_>,
        pattern: &str,
        options: &SearchOptions,
    ) -> IndexResult<Vec<SearchHit>> {
        let Some(symbols) = view.symbols() else {
            // Symbol index unhealthy: nothing to verify against.
            return Ok(Vec::new());
        };

        let pattern_shingles = shingles_of_pattern(pattern);
        let (candidates, unconstrained): (Option<BTreeSet<FileId>>, bool) = match view.trigram() {
            Some(trigram) => {
                let set = trigram.candidates(&pattern_shingles);
                if set.unconstrained {
                    (None, true)
                } else {
                    (Some(set.files), false)
                }
            }
            // Trigram unhealthy: fall back to the full scan path.
            None => (None, true),
        };

        let files: Vec<FileId> = match &candidates {
            Some(set) => set.iter().copied().collect(),
            None => symbols.committed_files().collect(),
        };

        let mut hits = Vec::new();
        for file_id in files {
            let entry = view.locations().and_then(|l| l.get(file_id));
            let path = match entry {
                Some(e) => e.path.as_ref(),
                None => symbols.path_of(file_id).unwrap_or_default(),
            };
            if let Some(prefix) = &options.path_prefix {
                if !path.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            let category = entry
                .map(|e| e.language.category())
                .unwrap_or(crate::parsing::FileCategory::Code);

            let mut symbol_lines: BTreeSet<u32> = BTreeSet::new();
            for record in symbols.symbols_in(file_id) {
                if let Some(kinds) = &options.kinds {
                    if !kinds.contains(&record.kind) {
                        continue;
                    }
                }
                let Some((base, layer)) = score::score_name(
                    pattern,
                    &record.name,
                    record.annotations.as_ref(),
                    &self.settings.scoring,
                    options.case_sensitive,
                ) else {
                    continue;
                };
                let adjustment =
                    score::ranking_adjustment(category, true, &self.settings.ranking);
                symbol_lines.insert(record.location.line);
                hits.push(SearchHit {
                    id: Some(record.id.compact()),
                    name: record.name.to_string(),
                    kind: Some(record.kind),
                    path: path.to_string(),
                    line: record.location.line,
                    column: record.location.column,
                    score: base + adjustment,
                    layer: Some(layer),
                    signature: record.signature.as_deref().map(str::to_string),
                    doc: record.doc.as_deref().map(str::to_string),
                });
            }

            // Content hits verify the pattern against the file's bytes.
            // Skipped when the caller requires a symbol, and on
            // unconstrained patterns where re-reading every file would be
            // pathological.
            if !options.require_symbol && !unconstrained {
                if let Some(entry) = entry {
                    self.content_hits(
                        pattern,
                        options,
                        entry,
                        category,
                        &symbol_lines,
                        &mut hits,
                    );
                }
            }
        }
        Ok(hits)
    }

    fn content_hits(
        &self,
        pattern: &str,
        options: &SearchOptions,
        entry: &FileEntry,
        category: crate::parsing::FileCategory,
        symbol_lines: &BTreeSet<u32>,
        hits: &mut Vec<SearchHit>,
    ) {
        if entry.state != FileState::Committed {
            return;
        }
        let absolute = self.settings.project_root.join(entry.path.as_ref());
        let Ok(content) = std::fs::read_to_string(&absolute) else {
            // The watcher will catch up with whatever happened on disk.
            return;
        };

        let needle = if options.case_sensitive {
            pattern.to_string()
        } else {
            pattern.to_lowercase()
        };
        let base = self.settings.scoring.substring * 100.0;
        let adjustment = score::ranking_adjustment(category, false, &self.settings.ranking);

        for (index, line) in content.lines().enumerate() {
            let line_no = (index + 1) as u32;
            if symbol_lines.contains(&line_no) {
                continue;
            }
            let haystack = if options.case_sensitive {
                line.to_string()
            } else {
                line.to_lowercase()
            };
            if let Some(byte_col) = haystack.find(needle.as_str()) {
                hits.push(SearchHit {
                    id: None,
                    name: pattern.to_string(),
                    kind: None,
                    path: entry.path.to_string(),
                    line: line_no,
                    column: byte_col.min(u16::MAX as usize) as u16,
                    score: base + adjustment,
                    layer: Some(MatchLayer::Substring),
                    signature: Some(line.trim().chars().take(160).collect()),
                    doc: None,
                });
            }
        }
    }
}

/// A symbol that matched the pattern, for reference queries.
struct MatchedSymbol {
    id: CompositeSymbolId,
    score: f32,
    layer: MatchLayer,
}

fn matching_symbols(
    view: &ReadView<'_>,
    pattern: &str,
    weights: &crate::config::ScoringConfig,
) -> Vec<MatchedSymbol> {
    let Some(symbols) = view.symbols() else {
        return Vec::new();
    };
    let mut matched = Vec::new();
    for name in symbols.names() {
        let Some((score, layer)) = score::score_name(pattern, name, None, weights, false) else {
            continue;
        };
        // Reference lookups only follow confident name matches.
        if !matches!(layer, MatchLayer::Exact | MatchLayer::Substring) {
            continue;
        }
        for id in symbols.lookup_by_name(name) {
            matched.push(MatchedSymbol { id, score, layer });
        }
    }
    matched
}

/// Deterministic ordering plus cutoffs: score descending, then path, then
/// (line, column); drop below `min_score`; truncate to `max_results`.
fn finish(hits: &mut Vec<SearchHit>, min_score: f32, max_results: usize) {
    hits.retain(|h| h.score >= min_score);
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.line.cmp(&b.line))
            .then_with(|| a.column.cmp(&b.column))
    });
    let cap = if max_results == 0 {
        DEFAULT_MAX_RESULTS
    } else {
        max_results
    };
    hits.truncate(cap);
}
