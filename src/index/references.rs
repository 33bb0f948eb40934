//! Reference index: symbol → incoming references and file → outgoing
//! references.
//!
//! References are stored by composite id rather than as a cross-pointer
//! graph, so mutation stays local to a file's commit and resolution is a
//! lookup. Cross-file integrity is best-effort: an external reference may
//! dangle (`symbol: None`) until its target file is indexed.

use crate::types::{CompositeSymbolId, FileId, Reference};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ReferenceIndex {
    /// Incoming references per resolved target.
    by_symbol: HashMap<CompositeSymbolId, Vec<Reference>>,
    /// Outgoing references keyed by the file that emitted them.
    by_file: HashMap<FileId, Vec<Reference>>,
}

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace the references emitted from a file.
    pub fn commit(&mut self, file_id: FileId, references: Vec<Reference>) {
        self.unlink_file(file_id);
        for reference in &references {
            if let Some(target) = reference.symbol {
                self.by_symbol
                    .entry(target)
                    .or_default()
                    .push(reference.clone());
            }
        }
        if references.is_empty() {
            self.by_file.remove(&file_id);
        } else {
            self.by_file.insert(file_id, references);
        }
    }

    /// Drop everything a file emitted (deletion or eviction).
    pub fn remove_file(&mut self, file_id: FileId) {
        self.unlink_file(file_id);
        self.by_file.remove(&file_id);
    }

    fn unlink_file(&mut self, file_id: FileId) {
        let Some(old) = self.by_file.get(&file_id) else {
            return;
        };
        for reference in old {
            if let Some(target) = reference.symbol {
                if let Some(incoming) = self.by_symbol.get_mut(&target) {
                    incoming.retain(|r| r.location.file_id != file_id);
                    if incoming.is_empty() {
                        self.by_symbol.remove(&target);
                    }
                }
            }
        }
    }

    pub fn references_to(&self, id: CompositeSymbolId) -> impl Iterator<Item = &Reference> + '_ {
        self.by_symbol
            .get(&id)
            .map(|r| r.as_slice())
            .unwrap_or(&[])
            .iter()
    }

    pub fn references_from(&self, file_id: FileId) -> impl Iterator<Item = &Reference> + '_ {
        self.by_file
            .get(&file_id)
            .map(|r| r.as_slice())
            .unwrap_or(&[])
            .iter()
    }

    /// Every outgoing reference of every file. Query-time re-resolution of
    /// dangling references walks this.
    pub fn iter_outgoing(&self) -> impl Iterator<Item = &Reference> + '_ {
        self.by_file.values().flat_map(|refs| refs.iter())
    }

    pub fn reference_count(&self) -> usize {
        self.by_file.values().map(Vec::len).sum()
    }

    pub fn approximate_bytes(&self) -> usize {
        let per_ref = std::mem::size_of::<Reference>();
        self.by_file
            .values()
            .flat_map(|refs| refs.iter())
            .map(|r| per_ref * 2 + r.name.len())
            .sum()
    }
}
