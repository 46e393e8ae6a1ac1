//! Hybrid retrieval
//!
//! - `PriorityMerge`: prefix dedup and source-class prioritisation of a pooled
//!   result list
//! - `HybridRetriever`: issues the global and PDF-targeted queries against a
//!   `VectorIndex`, merges them, and degrades to a single query on failure

mod fusion;
mod hybrid;

pub use fusion::{dedup_key, PriorityMerge};
pub use hybrid::HybridRetriever;

use docqa_common::models::ScoredChunk;

/// Common trait for retrievers
///
/// Infallible by contract: failures degrade to fewer (or zero) chunks.
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    /// At most `k` chunks, most useful first
    async fn retrieve(&self, query: &str, k: usize) -> Vec<ScoredChunk>;
}
