//! Data model shared by every DocQA crate
//!
//! - `Document`: one scraped page or PDF, keyed by URL
//! - `Chunk`: a bounded span of a document, the unit that is embedded
//! - `ScoredChunk`: a chunk returned by a similarity query
//! - `Answer`: the structured reply handed back to callers

mod answer;
mod chunk;
mod document;

pub use answer::{Answer, AnswerStatus, SourceRef};
pub use chunk::{Chunk, ScoredChunk, SourceKind};
pub use document::Document;
