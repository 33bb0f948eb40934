//! The coordinated multi-index store.
//!
//! Five index types (trigram candidates, symbols, references, file
//! entries, and the reverse shingle map), mutated only through the
//! coordinator's per-type write locks and read through consistent
//! snapshots.

pub mod coordinator;
pub mod locations;
pub mod postings;
pub mod references;
pub mod symbols;
pub mod trigram;

pub use coordinator::{
    FileDelta, IndexCoordinator, IndexKind, IndexWarning, ReadView, Requirements,
};
pub use locations::{FileEntry, FileState, LocationIndex};
pub use postings::PostingTracker;
pub use references::ReferenceIndex;
pub use symbols::{SymbolStore, normalize_path};
pub use trigram::{CandidateSet, TrigramIndex};
