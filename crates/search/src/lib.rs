//! DocQA Search
//!
//! Turns a question into an ordered, bounded list of chunks:
//! - Query routing (keyword rules that rewrite the query and pick k)
//! - Hybrid retrieval (global and PDF-targeted pools, prefix dedup,
//!   source-class prioritisation, single-query fallback)

pub mod retrieval;
pub mod router;

pub use retrieval::{HybridRetriever, PriorityMerge, Retriever};
pub use router::{QueryRouter, RoutedQuery};
