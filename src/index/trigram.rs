//! Trigram candidate index.
//!
//! Maps each 3-scalar shingle to the ordered, deduplicated set of file ids
//! whose content contains it. The candidate set is a filter, not a match:
//! later stages verify hits and compute positions. Removal consumes the
//! exact shingle list the postings tracker recorded at add time, keeping
//! `remove` symmetric with `add`.

use crate::types::{FileId, Shingle};
use std::collections::{BTreeSet, HashMap};

/// Result of candidate filtering for one pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet {
    pub files: BTreeSet<FileId>,
    /// True when the pattern was too short to produce shingles; the caller
    /// must scan without trigram filtering and avoid pathological work.
    pub unconstrained: bool,
}

impl CandidateSet {
    pub fn unconstrained() -> Self {
        Self {
            files: BTreeSet::new(),
            unconstrained: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct TrigramIndex {
    postings: HashMap<Shingle, BTreeSet<FileId>>,
}

impl TrigramIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file into the posting list of each shingle.
    pub fn add(&mut self, file_id: FileId, shingles: &[Shingle]) {
        for &shingle in shingles {
            self.postings.entry(shingle).or_default().insert(file_id);
        }
    }

    /// Drop a file from the posting lists it was added under. `shingles`
    /// must be the list recorded when the file was added.
    pub fn remove(&mut self, file_id: FileId, shingles: &[Shingle]) {
        for shingle in shingles {
            if let Some(posting) = self.postings.get_mut(shingle) {
                posting.remove(&file_id);
                if posting.is_empty() {
                    self.postings.remove(shingle);
                }
            }
        }
    }

    /// All files whose shingle set is a superset of the pattern's shingle
    /// set. Patterns below three scalars yield an unconstrained result.
    pub fn candidates(&self, pattern_shingles: &[Shingle]) -> CandidateSet {
        let Some((first, rest)) = pattern_shingles.split_first() else {
            return CandidateSet::unconstrained();
        };

        let Some(mut files) = self.postings.get(first).cloned() else {
            return CandidateSet {
                files: BTreeSet::new(),
                unconstrained: false,
            };
        };

        for shingle in rest {
            match self.postings.get(shingle) {
                Some(posting) => {
                    files.retain(|id| posting.contains(id));
                    if files.is_empty() {
                        break;
                    }
                }
                None => {
                    files.clear();
                    break;
                }
            }
        }

        CandidateSet {
            files,
            unconstrained: false,
        }
    }

    /// Posting list for one shingle, for invariant checks.
    pub fn posting(&self, shingle: &Shingle) -> Option<&BTreeSet<FileId>> {
        self.postings.get(shingle)
    }

    pub fn shingle_count(&self) -> usize {
        self.postings.len()
    }

    /// Approximate heap usage, for the memory ceiling accounting.
    pub fn approximate_bytes(&self) -> usize {
        self.postings
            .iter()
            .map(|(_, posting)| std::mem::size_of::<Shingle>() + posting.len() * 16)
            .sum()
    }
}
