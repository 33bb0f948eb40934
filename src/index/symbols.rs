//! Symbol store: path registry, per-file symbol tables, and the
//! name-keyed secondary index.
//!
//! Local symbol ids are assigned monotonically per file starting at 1, so
//! a symbol's composite id is its table position and changes on every
//! commit. The path ↔ FileId mapping survives file deletion: a recreated
//! path gets its old id back, and an id is never reassigned to a
//! different path.

use crate::error::{IndexError, IndexResult};
use crate::parsing::ParsedSymbol;
use crate::types::{CompositeSymbolId, FileId, SourceLocation, SymbolRecord};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Forward-slash normalize a path string.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

#[derive(Debug, Default)]
pub struct SymbolStore {
    /// Normalized path -> id. Entries are never removed.
    paths: HashMap<Box<str>, FileId>,
    /// id -> normalized path, the reverse of `paths`.
    ids: HashMap<FileId, Box<str>>,
    /// Per-file symbol tables; local id = position + 1.
    tables: HashMap<FileId, Vec<SymbolRecord>>,
    /// Secondary index: name -> composite ids, insertion-ordered for
    /// deterministic enumeration.
    names: IndexMap<Box<str>, Vec<CompositeSymbolId>>,
    next_file: u32,
}

impl SymbolStore {
    pub fn new() -> Self {
        Self {
            next_file: 1,
            ..Self::default()
        }
    }

    /// Register a path, returning its stable id. Idempotent under path
    /// equality after forward-slash normalization.
    pub fn register_file(&mut self, path: &str) -> IndexResult<FileId> {
        let normalized = normalize_path(path);
        if let Some(&id) = self.paths.get(normalized.as_str()) {
            return Ok(id);
        }

        let id = FileId::new(self.next_file).ok_or(IndexError::FileIdExhausted)?;
        self.next_file = self
            .next_file
            .checked_add(1)
            .ok_or(IndexError::FileIdExhausted)?;

        let normalized: Box<str> = normalized.into();
        self.paths.insert(normalized.clone(), id);
        self.ids.insert(id, normalized);
        Ok(id)
    }

    /// Already-registered id for a path, if any.
    pub fn file_id(&self, path: &str) -> Option<FileId> {
        self.paths.get(normalize_path(path).as_str()).copied()
    }

    pub fn path_of(&self, file_id: FileId) -> Option<&str> {
        self.ids.get(&file_id).map(AsRef::as_ref)
    }

    /// Atomically replace the symbol table for a file and rebuild its
    /// slice of the name index. A zero-symbol commit is valid and clears
    /// any previous symbols.
    pub fn commit(&mut self, file_id: FileId, symbols: Vec<ParsedSymbol>) -> IndexResult<()> {
        if !self.ids.contains_key(&file_id) {
            return Err(IndexError::FileNotFound { id: file_id });
        }

        self.unlink_names(file_id);

        let records: Vec<SymbolRecord> = symbols
            .into_iter()
            .enumerate()
            .map(|(position, symbol)| SymbolRecord {
                id: CompositeSymbolId::new(file_id, (position + 1) as u32),
                location: SourceLocation::new(file_id, symbol.line, symbol.column),
                name: symbol.name,
                kind: symbol.kind,
                scope: symbol.scope,
                signature: symbol.signature,
                doc: symbol.doc,
                annotations: symbol.annotations,
            })
            .collect();

        for record in &records {
            self.names
                .entry(record.name.clone())
                .or_default()
                .push(record.id);
        }
        self.tables.insert(file_id, records);
        Ok(())
    }

    /// Drop a file's symbols (deletion or eviction). The path registration
    /// stays so the id remains stable if the path comes back.
    pub fn remove_file(&mut self, file_id: FileId) {
        self.unlink_names(file_id);
        self.tables.remove(&file_id);
    }

    fn unlink_names(&mut self, file_id: FileId) {
        let Some(old) = self.tables.get(&file_id) else {
            return;
        };
        for record in old {
            if let Some(ids) = self.names.get_mut(&record.name) {
                ids.retain(|id| id.file != file_id);
                if ids.is_empty() {
                    self.names.swap_remove(&record.name);
                }
            }
        }
    }

    /// Composite ids declared under a name. Case-sensitive; callers
    /// wanting case-insensitive behavior pre-lowercase on both sides.
    pub fn lookup_by_name(&self, name: &str) -> impl Iterator<Item = CompositeSymbolId> + '_ {
        self.names
            .get(name)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
            .iter()
            .copied()
    }

    pub fn symbols_in(&self, file_id: FileId) -> impl Iterator<Item = &SymbolRecord> + '_ {
        self.tables
            .get(&file_id)
            .map(|t| t.as_slice())
            .unwrap_or(&[])
            .iter()
    }

    pub fn resolve(&self, id: CompositeSymbolId) -> Option<&SymbolRecord> {
        if id.local == 0 {
            return None;
        }
        self.tables
            .get(&id.file)?
            .get((id.local - 1) as usize)
            .filter(|record| record.id == id)
    }

    /// Iterate every name in the secondary index.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.keys().map(AsRef::as_ref)
    }

    /// All currently committed file ids.
    pub fn committed_files(&self) -> impl Iterator<Item = FileId> + '_ {
        self.tables.keys().copied()
    }

    pub fn file_count(&self) -> usize {
        self.tables.len()
    }

    pub fn symbol_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    pub fn approximate_bytes(&self) -> usize {
        let table_bytes: usize = self
            .tables
            .values()
            .flat_map(|t| t.iter())
            .map(|r| {
                std::mem::size_of::<SymbolRecord>()
                    + r.name.len()
                    + r.signature.as_deref().map_or(0, str::len)
                    + r.doc.as_deref().map_or(0, str::len)
            })
            .sum();
        let name_bytes: usize = self
            .names
            .iter()
            .map(|(name, ids)| name.len() + ids.len() * std::mem::size_of::<CompositeSymbolId>())
            .sum();
        table_bytes + name_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ScopeKind, SymbolKind};

    fn sym(name: &str, kind: SymbolKind, line: u32) -> ParsedSymbol {
        ParsedSymbol {
            name: name.into(),
            kind,
            scope: ScopeKind::Module,
            line,
            column: 0,
            ..ParsedSymbol::default()
        }
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut store = SymbolStore::new();
        let a = store.register_file("src/main.rs").unwrap();
        let b = store.register_file("src/main.rs").unwrap();
        assert_eq!(a, b);
        assert_eq!(store.path_of(a), Some("src/main.rs"));
    }

    #[test]
    fn test_register_normalizes_separators() {
        let mut store = SymbolStore::new();
        let a = store.register_file("src\\windows\\path.rs").unwrap();
        let b = store.register_file("src/windows/path.rs").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_local_ids_start_at_one() {
        let mut store = SymbolStore::new();
        let file = store.register_file("a.rs").unwrap();
        store
            .commit(file, vec![sym("first", SymbolKind::Function, 1)])
            .unwrap();

        let record = store.symbols_in(file).next().unwrap();
        assert_eq!(record.id, CompositeSymbolId::new(file, 1));
    }

    #[test]
    fn test_commit_replaces_and_rebuilds_name_index() {
        let mut store = SymbolStore::new();
        let file = store.register_file("a.rs").unwrap();
        store
            .commit(file, vec![sym("old_name", SymbolKind::Function, 1)])
            .unwrap();
        assert_eq!(store.lookup_by_name("old_name").count(), 1);

        store
            .commit(file, vec![sym("new_name", SymbolKind::Function, 1)])
            .unwrap();
        assert_eq!(store.lookup_by_name("old_name").count(), 0);
        assert_eq!(store.lookup_by_name("new_name").count(), 1);
    }

    #[test]
    fn test_zero_symbol_commit_clears() {
        let mut store = SymbolStore::new();
        let file = store.register_file("a.rs").unwrap();
        store
            .commit(file, vec![sym("gone", SymbolKind::Function, 1)])
            .unwrap();
        store.commit(file, Vec::new()).unwrap();

        assert_eq!(store.lookup_by_name("gone").count(), 0);
        assert_eq!(store.symbols_in(file).count(), 0);
        // Still counted as a committed (empty) file.
        assert_eq!(store.file_count(), 1);
    }

    #[test]
    fn test_name_index_agrees_with_tables() {
        let mut store = SymbolStore::new();
        let a = store.register_file("a.rs").unwrap();
        let b = store.register_file("b.rs").unwrap();
        store
            .commit(
                a,
                vec![
                    sym("shared", SymbolKind::Function, 1),
                    sym("only_a", SymbolKind::Struct, 2),
                ],
            )
            .unwrap();
        store
            .commit(b, vec![sym("shared", SymbolKind::Function, 5)])
            .unwrap();

        for name in ["shared", "only_a"] {
            for id in store.lookup_by_name(name).collect::<Vec<_>>() {
                let record = store.resolve(id).expect("name index points at live record");
                assert_eq!(record.name.as_ref(), name);
            }
        }
        assert_eq!(store.lookup_by_name("shared").count(), 2);
    }

    #[test]
    fn test_resolve_rejects_stale_local() {
        let mut store = SymbolStore::new();
        let file = store.register_file("a.rs").unwrap();
        store
            .commit(
                file,
                vec![
                    sym("one", SymbolKind::Function, 1),
                    sym("two", SymbolKind::Function, 2),
                ],
            )
            .unwrap();
        let stale = CompositeSymbolId::new(file, 2);
        store
            .commit(file, vec![sym("one", SymbolKind::Function, 1)])
            .unwrap();
        assert!(store.resolve(stale).is_none());
        assert!(store.resolve(CompositeSymbolId::new(file, 0)).is_none());
    }

    #[test]
    fn test_delete_then_recreate_keeps_id() {
        let mut store = SymbolStore::new();
        let file = store.register_file("a.rs").unwrap();
        store
            .commit(file, vec![sym("f", SymbolKind::Function, 1)])
            .unwrap();
        store.remove_file(file);
        assert_eq!(store.file_count(), 0);

        let again = store.register_file("a.rs").unwrap();
        assert_eq!(file, again);
    }

    #[test]
    fn test_commit_unregistered_file_fails() {
        let mut store = SymbolStore::new();
        let ghost = FileId::new(99).unwrap();
        assert!(matches!(
            store.commit(ghost, Vec::new()),
            Err(IndexError::FileNotFound { .. })
        ));
    }
}
