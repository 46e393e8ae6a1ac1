//! DocQA Context Engine
//!
//! Turns a question into an answer:
//! - Answer composition over retrieved chunks
//! - The QA engine that wires router, retriever, composer, cache and discovery
//! - Startup bootstrap with a readiness report

pub mod bootstrap;
pub mod composer;
pub mod engine;

pub use bootstrap::{build_engine, Bootstrap, Readiness};
pub use composer::AnswerComposer;
pub use engine::QaEngine;
