//! Hybrid retrieval combining a global query with a PDF-targeted pool
//!
//! The index has no per-source filter, so the PDF pool is an over-fetched
//! similarity query filtered by source suffix.

use super::{fusion::PriorityMerge, Retriever};
use docqa_common::config::{RetrievalConfig, SearchMode};
use docqa_common::errors::Result;
use docqa_common::metrics;
use docqa_common::models::{ScoredChunk, SourceKind};
use docqa_common::VectorIndex;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct HybridRetriever {
    index: Arc<dyn VectorIndex>,
    merge: PriorityMerge,
    mode: SearchMode,
    pdf_pool_factor: usize,
    fallback_k: usize,
    mmr_fetch_factor: usize,
    mmr_lambda: f32,
}

impl HybridRetriever {
    pub fn new(index: Arc<dyn VectorIndex>, config: &RetrievalConfig) -> Self {
        Self {
            index,
            merge: PriorityMerge::from_config(config),
            mode: config.mode,
            pdf_pool_factor: config.pdf_pool_factor.max(1),
            fallback_k: config.fallback_k,
            mmr_fetch_factor: config.mmr_fetch_factor.max(1),
            mmr_lambda: config.mmr_lambda,
        }
    }

    async fn primary(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        match self.mode {
            SearchMode::Similarity => self.index.similarity_search(query, k).await,
            SearchMode::Mmr => {
                self.index
                    .max_marginal_relevance_search(
                        query,
                        k,
                        k * self.mmr_fetch_factor,
                        self.mmr_lambda,
                    )
                    .await
            }
        }
    }

    /// Global results plus PDF-only results, PDF pool first
    async fn pooled(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let global = self.primary(query, k).await?;
        let pdf: Vec<ScoredChunk> = self
            .index
            .similarity_search(query, k * self.pdf_pool_factor)
            .await?
            .into_iter()
            .filter(|c| c.kind() == SourceKind::Pdf)
            .collect();

        debug!(global = global.len(), pdf = pdf.len(), "Retrieval pools fetched");

        let mut pool = pdf;
        pool.extend(global);
        Ok(pool)
    }
}

#[async_trait::async_trait]
impl Retriever for HybridRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Vec<ScoredChunk> {
        if k == 0 {
            return Vec::new();
        }

        match self.pooled(query, k).await {
            Ok(pool) => return self.merge.merge(pool, k),
            Err(e) => {
                warn!(error = %e, k = k, "Hybrid retrieval failed, falling back to single query");
            }
        }

        let fallback_k = k.min(self.fallback_k);
        match self.index.similarity_search(query, fallback_k).await {
            Ok(pool) => {
                metrics::record_retrieval_fallback(true);
                self.merge.merge(pool, fallback_k)
            }
            Err(e) => {
                metrics::record_retrieval_fallback(false);
                warn!(error = %e, "Fallback retrieval failed, returning no results");
                Vec::new()
            }
        }
    }
}
