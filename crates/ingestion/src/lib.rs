//! DocQA Ingestion
//!
//! Everything that writes to the document store or the vector index:
//! - Semantic chunker with guaranteed overlap
//! - PDF text extraction
//! - Checkpointed, cancellable index rebuilds with an atomic directory swap
//! - Incremental adds (PDFs, scraped JSON)
//! - On-demand discovery of help pages from a URL master list

pub mod checkpoint;
pub mod chunker;
pub mod discovery;
pub mod errors;
pub mod job;
pub mod pdf;
pub mod processor;

pub use chunker::{reassemble, Chunker};
pub use discovery::{Discovery, DiscoveryReport, HttpPageFetcher, PageFetcher};
pub use errors::IngestionError;
pub use job::{BuildOutcome, IndexBuildJob};
pub use processor::IngestionProcessor;
