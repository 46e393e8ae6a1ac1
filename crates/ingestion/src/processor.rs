//! Ingestion processor
//!
//! Core logic for incremental adds: PDF extraction, page fetching, chunking,
//! and indexing into an existing vector index. Chunks are indexed before
//! their document is appended to the store, so a failed `add` leaves nothing
//! behind that would make a retry look like a duplicate.

use crate::chunker::Chunker;
use crate::discovery::PageFetcher;
use crate::errors::IngestionError;
use crate::pdf::pdf_document;
use docqa_common::metrics;
use docqa_common::models::{Chunk, Document};
use docqa_common::{DocumentStore, VectorIndex};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Category given to pages added by URL
pub const ADDITIONAL_CATEGORY: &str = "Additional";

/// Result of adding one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added { chunks: usize },
    Duplicate,
    TooShort,
}

/// Totals for a multi-document add
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
    pub chunks: usize,
}

pub struct IngestionProcessor {
    chunker: Chunker,
    index: Arc<dyn VectorIndex>,
}

impl IngestionProcessor {
    pub fn new(chunker: Chunker, index: Arc<dyn VectorIndex>) -> Self {
        Self { chunker, index }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Chunks worth embedding; whitespace-only chunks are dropped
    pub fn chunk_document(&self, doc: &Document) -> Vec<Chunk> {
        self.chunker
            .split(doc)
            .filter(|c| !c.text.trim().is_empty())
            .collect()
    }

    /// Whether a URL is already stored or indexed
    pub async fn is_known(&self, store: &DocumentStore, url: &str) -> Result<bool, IngestionError> {
        Ok(store.contains(url) || self.index.contains_source(url).await?)
    }

    /// Chunk and index documents with a single `add` call
    pub async fn index_documents(&self, docs: &[Document], source: &str) -> Result<usize, IngestionError> {
        let chunks: Vec<Chunk> = docs.iter().flat_map(|d| self.chunk_document(d)).collect();
        if chunks.is_empty() {
            return Ok(0);
        }
        let added = self.index.add(chunks).await?;
        metrics::record_chunks_indexed(added, source);
        debug!(documents = docs.len(), chunks = added, source = source, "Documents indexed");
        Ok(added)
    }

    /// Index one document's chunks, then append it to the store
    ///
    /// The caller flushes the index.
    pub async fn add_document(
        &self,
        store: &mut DocumentStore,
        doc: Document,
        source: &str,
    ) -> Result<AddOutcome, IngestionError> {
        if self.is_known(store, &doc.url).await? {
            return Ok(AddOutcome::Duplicate);
        }

        let chunks = self.index_documents(std::slice::from_ref(&doc), source).await?;
        store.append(doc)?;
        Ok(AddOutcome::Added { chunks })
    }

    /// Extract a PDF, index its chunks, and store it
    #[instrument(skip(self, store), fields(path = %path.display()))]
    pub async fn add_pdf(&self, store: &mut DocumentStore, path: &Path) -> Result<AddOutcome, IngestionError> {
        let doc = pdf_document(path)?;
        let outcome = self.add_document(store, doc, "pdf").await?;
        match outcome {
            AddOutcome::Added { chunks } => {
                self.index.flush().await?;
                info!(chunks = chunks, "PDF added to vector index");
            }
            _ => info!("PDF already ingested, skipping"),
        }
        Ok(outcome)
    }

    /// Add every `*.pdf` in a directory; per-file failures are logged and counted
    #[instrument(skip(self, store), fields(dir = %dir.display()))]
    pub async fn add_pdfs(&self, store: &mut DocumentStore, dir: &Path) -> Result<BatchSummary, IngestionError> {
        if !dir.is_dir() {
            return Err(IngestionError::FileNotFound(dir.display().to_string()));
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        info!(files = paths.len(), "Batch processing PDFs");

        let mut summary = BatchSummary::default();
        for path in paths {
            match self.add_pdf(store, &path).await {
                Ok(AddOutcome::Added { chunks }) => {
                    summary.added += 1;
                    summary.chunks += chunks;
                }
                Ok(_) => summary.skipped += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to add PDF");
                    summary.failed += 1;
                }
            }
        }

        info!(
            added = summary.added,
            skipped = summary.skipped,
            failed = summary.failed,
            chunks = summary.chunks,
            "Finished batch processing"
        );
        Ok(summary)
    }

    /// Index scraped documents that are new, then store them
    #[instrument(skip(self, store, docs), fields(count = docs.len()))]
    pub async fn add_documents(&self, store: &mut DocumentStore, docs: Vec<Document>) -> Result<BatchSummary, IngestionError> {
        let offered = docs.len();
        let mut urls = HashSet::with_capacity(offered);
        let mut fresh = Vec::with_capacity(offered);
        for doc in docs {
            if urls.insert(doc.url.clone()) && !self.is_known(store, &doc.url).await? {
                fresh.push(doc);
            }
        }

        let chunks = self.index_documents(&fresh, "documents").await?;
        self.index.flush().await?;
        store.extend(fresh.iter().cloned())?;

        let summary = BatchSummary {
            added: fresh.len(),
            skipped: offered - fresh.len(),
            failed: 0,
            chunks,
        };
        info!(added = summary.added, skipped = summary.skipped, chunks = chunks, "Documents added");
        Ok(summary)
    }

    /// Fetch pages by URL and add the ones with enough text
    #[instrument(skip(self, store, fetcher, urls), fields(count = urls.len()))]
    pub async fn add_urls(
        &self,
        store: &mut DocumentStore,
        fetcher: &dyn PageFetcher,
        urls: &[String],
        min_content_chars: usize,
    ) -> Result<BatchSummary, IngestionError> {
        let mut summary = BatchSummary::default();
        for url in urls {
            if self.is_known(store, url).await? {
                info!(url = %url, "URL already exists, skipping");
                summary.skipped += 1;
                continue;
            }

            let outcome = match fetcher.fetch(url).await {
                Ok(page) if page.content.chars().count() < min_content_chars => Ok(AddOutcome::TooShort),
                Ok(page) => {
                    let doc = Document::new(page.url, page.title, page.content, ADDITIONAL_CATEGORY);
                    self.add_document(store, doc, "url").await
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(AddOutcome::Added { chunks }) => {
                    summary.added += 1;
                    summary.chunks += chunks;
                }
                Ok(AddOutcome::TooShort) => {
                    warn!(url = %url, "Page content too short, skipping");
                    summary.skipped += 1;
                }
                Ok(AddOutcome::Duplicate) => summary.skipped += 1,
                Err(e) => {
                    warn!(url = %url, error = %e, "Failed to add URL");
                    summary.failed += 1;
                }
            }
        }

        if summary.chunks > 0 {
            self.index.flush().await?;
        }
        info!(
            added = summary.added,
            skipped = summary.skipped,
            failed = summary.failed,
            chunks = summary.chunks,
            "URLs added"
        );
        Ok(summary)
    }

    /// Read a JSON array of documents from `path` and add them
    pub async fn add_documents_file(&self, store: &mut DocumentStore, path: &Path) -> Result<BatchSummary, IngestionError> {
        if !path.is_file() {
            return Err(IngestionError::FileNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let docs: Vec<Document> = serde_json::from_str(&raw)?;
        self.add_documents(store, docs).await
    }
}
