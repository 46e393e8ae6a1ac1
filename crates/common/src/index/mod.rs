//! Vector index contract
//!
//! The index is a derived, rebuildable cache of the document store. It embeds
//! chunks on `add` and answers similarity and max-marginal-relevance queries.

mod local;

pub use local::{IndexEntry, IndexFile, LocalVectorIndex, INDEX_FILE_NAME};

use crate::errors::Result;
use crate::models::{Chunk, ScoredChunk};
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top `k` chunks by cosine similarity, best first
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>>;

    /// `k` chunks picked from the `fetch_k` nearest, trading relevance for diversity
    async fn max_marginal_relevance_search(
        &self,
        query: &str,
        k: usize,
        fetch_k: usize,
        lambda: f32,
    ) -> Result<Vec<ScoredChunk>>;

    /// Embed and store chunks; returns how many were added
    async fn add(&self, chunks: Vec<Chunk>) -> Result<usize>;

    /// Number of stored chunks
    async fn count(&self) -> Result<usize>;

    /// Whether any chunk from `url` is stored
    async fn contains_source(&self, url: &str) -> Result<bool>;

    /// Persist pending changes
    async fn flush(&self) -> Result<()>;
}

/// Cosine similarity; zero vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Greedy max-marginal-relevance selection
///
/// `candidates` holds `(query similarity, embedding)` pairs. Returns indices
/// into `candidates` in selection order.
pub fn mmr_select(candidates: &[(f32, &[f32])], k: usize, lambda: f32) -> Vec<usize> {
    let mut selected: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (pos, &idx) in remaining.iter().enumerate() {
            let (relevance, embedding) = candidates[idx];
            let redundancy = selected
                .iter()
                .map(|&s| cosine_similarity(embedding, candidates[s].1))
                .fold(0.0f32, f32::max);
            let score = lambda * relevance - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }

        selected.push(remaining.remove(best_pos));
    }

    selected
}
