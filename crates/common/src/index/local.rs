//! Local brute-force vector index persisted as JSON
//!
//! Every created index gets a random build id. A handle only writes over the
//! file it opened: once a rebuild swaps a new index into the directory, the
//! old handle's flushes fail instead of discarding the rebuild.

use super::{cosine_similarity, mmr_select, VectorIndex};
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use crate::models::{Chunk, ScoredChunk};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

pub const INDEX_FILE_NAME: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: Uuid,
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// On-disk layout of `index.json`
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexFile {
    #[serde(default)]
    pub build_id: Uuid,
    pub model: String,
    pub dimension: usize,
    pub entries: Vec<IndexEntry>,
}

/// Only the identifying header of `index.json`
#[derive(Deserialize)]
struct IndexHeader {
    #[serde(default)]
    build_id: Uuid,
}

pub struct LocalVectorIndex {
    directory: PathBuf,
    build_id: Uuid,
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<IndexEntry>>,
}

impl LocalVectorIndex {
    /// Open an existing index directory
    pub fn open(directory: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        let file = directory.join(INDEX_FILE_NAME);
        if !directory.is_dir() || !file.is_file() {
            return Err(AppError::IndexMissing {
                path: directory.display().to_string(),
            });
        }

        let raw = fs::read_to_string(&file).map_err(|e| AppError::Index {
            message: format!("Failed to read {}: {}", file.display(), e),
        })?;
        let stored: IndexFile = serde_json::from_str(&raw).map_err(|e| AppError::Index {
            message: format!("Corrupt index file {}: {}", file.display(), e),
        })?;

        if stored.model != embedder.model_name() || stored.dimension != embedder.dimension() {
            return Err(AppError::Configuration {
                message: format!(
                    "Index at {} was built with {} ({} dims) but the embedder is {} ({} dims)",
                    directory.display(),
                    stored.model,
                    stored.dimension,
                    embedder.model_name(),
                    embedder.dimension()
                ),
            });
        }

        info!(
            path = %directory.display(),
            chunks = stored.entries.len(),
            model = %stored.model,
            "Vector index loaded"
        );

        Ok(Self {
            directory,
            build_id: stored.build_id,
            embedder,
            entries: RwLock::new(stored.entries),
        })
    }

    /// Create an empty index, replacing anything already in `directory`
    pub fn create(directory: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        if directory.exists() {
            fs::remove_dir_all(&directory)?;
        }
        fs::create_dir_all(&directory)?;

        let index = Self {
            directory,
            build_id: Uuid::new_v4(),
            embedder,
            entries: RwLock::new(Vec::new()),
        };
        write_index_file(&index.directory, &index.snapshot(Vec::new()), false)?;
        info!(path = %index.directory.display(), build_id = %index.build_id, "Vector index created");
        Ok(index)
    }

    /// Open if present, otherwise create empty
    pub fn open_or_create(directory: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        match Self::open(directory.as_ref(), embedder.clone()) {
            Err(AppError::IndexMissing { .. }) => Self::create(directory, embedder),
            other => other,
        }
    }

    /// Whether `directory` holds a persisted index
    pub fn exists(directory: impl AsRef<Path>) -> bool {
        directory.as_ref().join(INDEX_FILE_NAME).is_file()
    }

    /// Identity of the build this handle belongs to
    pub fn build_id(&self) -> Uuid {
        self.build_id
    }

    /// Directory this index is stored in
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn snapshot(&self, entries: Vec<IndexEntry>) -> IndexFile {
        IndexFile {
            build_id: self.build_id,
            model: self.embedder.model_name().to_string(),
            dimension: self.embedder.dimension(),
            entries,
        }
    }

    /// Score every entry against the query, best first, at most `limit`
    async fn nearest(&self, query: &str, limit: usize) -> Result<Vec<(f32, IndexEntry)>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self.embedder.embed(query).await?;

        let entries = self.entries.read().await;
        let mut scored: Vec<(f32, &IndexEntry)> = entries
            .iter()
            .map(|e| (cosine_similarity(&query_embedding, &e.embedding), e))
            .collect();
        // Stable sort keeps insertion order among ties
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(limit);

        Ok(scored.into_iter().map(|(s, e)| (s, e.clone())).collect())
    }
}

fn into_results(hits: impl IntoIterator<Item = (f32, Chunk)>) -> Vec<ScoredChunk> {
    hits.into_iter()
        .enumerate()
        .map(|(rank, (score, chunk))| ScoredChunk { chunk, score, rank })
        .collect()
}

#[async_trait]
impl VectorIndex for LocalVectorIndex {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let hits = self.nearest(query, k).await?;
        debug!(k = k, hits = hits.len(), "Similarity search");
        Ok(into_results(hits.into_iter().map(|(s, e)| (s, e.chunk))))
    }

    async fn max_marginal_relevance_search(
        &self,
        query: &str,
        k: usize,
        fetch_k: usize,
        lambda: f32,
    ) -> Result<Vec<ScoredChunk>> {
        let pool = self.nearest(query, fetch_k.max(k)).await?;
        let candidates: Vec<(f32, &[f32])> = pool
            .iter()
            .map(|(s, e)| (*s, e.embedding.as_slice()))
            .collect();
        let picked = mmr_select(&candidates, k, lambda);
        debug!(k = k, fetch_k = fetch_k, hits = picked.len(), "MMR search");

        Ok(into_results(
            picked
                .into_iter()
                .map(|i| (pool[i].0, pool[i].1.chunk.clone())),
        ))
    }

    async fn add(&self, chunks: Vec<Chunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(AppError::Index {
                message: format!(
                    "Embedder returned {} vectors for {} chunks",
                    embeddings.len(),
                    chunks.len()
                ),
            });
        }

        let added = chunks.len();
        let mut entries = self.entries.write().await;
        entries.extend(
            chunks
                .into_iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| IndexEntry {
                    id: Uuid::new_v4(),
                    chunk,
                    embedding,
                }),
        );
        Ok(added)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }

    async fn contains_source(&self, url: &str) -> Result<bool> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .any(|e| e.chunk.source_url == url))
    }

    async fn flush(&self) -> Result<()> {
        let snapshot = self.snapshot(self.entries.read().await.clone());
        let chunks = snapshot.entries.len();
        let directory = self.directory.clone();

        tokio::task::spawn_blocking(move || write_index_file(&directory, &snapshot, true))
            .await
            .map_err(|e| AppError::Index {
                message: format!("Index flush task failed: {}", e),
            })??;

        debug!(path = %self.directory.display(), chunks = chunks, "Vector index flushed");
        Ok(())
    }
}

/// Write `index.json` via a temporary file and rename
///
/// With `check_build`, refuses to replace a file written by a different build.
fn write_index_file(directory: &Path, file: &IndexFile, check_build: bool) -> Result<()> {
    let path = directory.join(INDEX_FILE_NAME);

    if check_build && path.is_file() {
        let raw = fs::read_to_string(&path).map_err(|e| AppError::Index {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        let on_disk: IndexHeader = serde_json::from_str(&raw).map_err(|e| AppError::Index {
            message: format!("Corrupt index file {}: {}", path.display(), e),
        })?;
        if on_disk.build_id != file.build_id {
            return Err(AppError::Index {
                message: format!(
                    "Index at {} was replaced by build {}; reopen it before writing",
                    directory.display(),
                    on_disk.build_id
                ),
            });
        }
    }

    let body = serde_json::to_string(file)?;
    let tmp = directory.join(format!("{}.tmp", INDEX_FILE_NAME));
    fs::write(&tmp, body).map_err(|e| AppError::Index {
        message: format!("Failed to write {}: {}", tmp.display(), e),
    })?;
    fs::rename(&tmp, &path).map_err(|e| AppError::Index {
        message: format!("Failed to replace {}: {}", path.display(), e),
    })?;
    Ok(())
}
