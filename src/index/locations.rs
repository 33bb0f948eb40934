//! File entry registry: per-file metadata and the indexing state machine.
//!
//! State transitions:
//! Unseen → Queued → Parsing → Committed | Failed; Committed → Queued on a
//! watcher event; Committed → Removed on delete. Failures are isolated to
//! the file and retain the previously committed content.

use crate::parsing::Language;
use crate::types::FileId;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Instant, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    Queued,
    Parsing,
    Committed,
    Failed,
    Removed,
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub id: FileId,
    /// Forward-slash normalized, relative to the project root.
    pub path: Box<str>,
    pub size: u64,
    pub mtime: Option<SystemTime>,
    pub language: Language,
    pub state: FileState,
    pub last_error: Option<Box<str>>,
    /// Stamp for least-recently-touched eviction.
    pub last_touched: Instant,
    pub symbol_count: usize,
    pub shingle_count: usize,
}

#[derive(Debug, Default)]
pub struct LocationIndex {
    files: HashMap<FileId, FileEntry>,
}

impl LocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a committed entry.
    pub fn commit(&mut self, entry: FileEntry) {
        self.files.insert(entry.id, entry);
    }

    pub fn remove(&mut self, file_id: FileId) -> Option<FileEntry> {
        self.files.remove(&file_id)
    }

    pub fn get(&self, file_id: FileId) -> Option<&FileEntry> {
        self.files.get(&file_id)
    }

    pub fn touch(&mut self, file_id: FileId) {
        if let Some(entry) = self.files.get_mut(&file_id) {
            entry.last_touched = Instant::now();
        }
    }

    pub fn set_state(&mut self, file_id: FileId, state: FileState, error: Option<String>) {
        if let Some(entry) = self.files.get_mut(&file_id) {
            entry.state = state;
            entry.last_error = error.map(Into::into);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> + '_ {
        self.files.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = FileId> + '_ {
        self.files.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Committed entries, least recently touched first. The eviction pass
    /// walks this until memory falls under the low-water mark.
    pub fn eviction_order(&self) -> Vec<FileId> {
        let mut entries: Vec<(&Instant, FileId)> = self
            .files
            .values()
            .filter(|e| e.state == FileState::Committed)
            .map(|e| (&e.last_touched, e.id))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, id)| id).collect()
    }

    pub fn approximate_bytes(&self) -> usize {
        self.files
            .values()
            .map(|e| std::mem::size_of::<FileEntry>() + e.path.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u32, path: &str) -> FileEntry {
        FileEntry {
            id: FileId::new(id).unwrap(),
            path: path.into(),
            size: 10,
            mtime: None,
            language: Language::Rust,
            state: FileState::Committed,
            last_error: None,
            last_touched: Instant::now(),
            symbol_count: 0,
            shingle_count: 0,
        }
    }

    #[test]
    fn test_commit_and_get() {
        let mut index = LocationIndex::new();
        index.commit(entry(1, "a.rs"));
        assert_eq!(index.get(FileId::new(1).unwrap()).unwrap().path.as_ref(), "a.rs");
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_state_transition_records_error() {
        let mut index = LocationIndex::new();
        index.commit(entry(1, "a.rs"));
        let id = FileId::new(1).unwrap();
        index.set_state(id, FileState::Failed, Some("parse exploded".into()));

        let e = index.get(id).unwrap();
        assert_eq!(e.state, FileState::Failed);
        assert_eq!(e.last_error.as_deref(), Some("parse exploded"));
    }

    #[test]
    fn test_eviction_order_is_least_recently_touched() {
        let mut index = LocationIndex::new();
        index.commit(entry(1, "a.rs"));
        std::thread::sleep(std::time::Duration::from_millis(2));
        index.commit(entry(2, "b.rs"));
        std::thread::sleep(std::time::Duration::from_millis(2));
        index.touch(FileId::new(1).unwrap());

        let order: Vec<u32> = index.eviction_order().iter().map(|f| f.value()).collect();
        assert_eq!(order, vec![2, 1]);
    }

    #[test]
    fn test_eviction_skips_non_committed() {
        let mut index = LocationIndex::new();
        let mut queued = entry(1, "a.rs");
        queued.state = FileState::Queued;
        index.commit(queued);
        index.commit(entry(2, "b.rs"));

        let order: Vec<u32> = index.eviction_order().iter().map(|f| f.value()).collect();
        assert_eq!(order, vec![2]);
    }
}
