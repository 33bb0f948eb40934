//! Search: the scoring pipeline, the query planner, and call-tree
//! expansion.

pub mod engine;
pub mod score;
pub mod tree;

pub use engine::{
    DEFAULT_MAX_RESULTS, CountersSnapshot, SearchCounters, SearchEngine, SearchHit,
    SearchOptions, SearchResponse, SymbolInfo,
};
pub use score::MatchLayer;
pub use tree::{TreeNode, TreeOptions, TreeResponse};
