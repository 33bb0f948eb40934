//! Reverse shingle map: file → the shingle list it was added under.
//!
//! This is what makes trigram removal O(|shingles|) instead of a scan of
//! the whole shingle alphabet, and what guarantees removal consumes
//! exactly the set that add produced.

use crate::types::{FileId, Shingle};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct PostingTracker {
    shingles: HashMap<FileId, Vec<Shingle>>,
}

impl PostingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the shingle list for a file, returning the previous list so
    /// the caller can unwind the trigram postings it produced.
    pub fn replace(&mut self, file_id: FileId, shingles: Vec<Shingle>) -> Vec<Shingle> {
        if shingles.is_empty() {
            self.shingles.remove(&file_id).unwrap_or_default()
        } else {
            self.shingles.insert(file_id, shingles).unwrap_or_default()
        }
    }

    pub fn remove(&mut self, file_id: FileId) -> Vec<Shingle> {
        self.shingles.remove(&file_id).unwrap_or_default()
    }

    pub fn get(&self, file_id: FileId) -> &[Shingle] {
        self.shingles
            .get(&file_id)
            .map(|s| s.as_slice())
            .unwrap_or(&[])
    }

    pub fn approximate_bytes(&self) -> usize {
        self.shingles
            .values()
            .map(|s| s.len() * std::mem::size_of::<Shingle>() + 16)
            .sum()
    }
}
