//! DocQA Common Library
//!
//! Shared code for all DocQA crates including:
//! - Data model (documents, chunks, answers)
//! - JSON document store
//! - Embedding client abstraction
//! - Vector index contract and local implementation
//! - Chat model clients
//! - Error types and handling
//! - Configuration management
//! - Metrics, tracing setup, and the answer cache

pub mod cache;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod index;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod store;
pub mod telemetry;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use index::{LocalVectorIndex, VectorIndex};
pub use llm::ChatModel;
pub use models::{Answer, AnswerStatus, Chunk, Document, ScoredChunk, SourceKind, SourceRef};
pub use store::DocumentStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name reported by the status endpoint
pub const ENGINE_NAME: &str = "DocQA Expert v3";
