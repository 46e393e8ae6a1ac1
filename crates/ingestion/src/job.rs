//! Checkpointed index rebuild
//!
//! Builds a fresh index from the document store into `<index_dir>.building`,
//! writing a checkpoint after every batch of documents. A cancelled or
//! crashed build resumes from its checkpoint when the document set is
//! unchanged. On completion the staging directory is swapped into place:
//! `index_dir` moves to `<index_dir>.previous`, staging moves to `index_dir`,
//! and the previous copy is removed.

use crate::checkpoint::BuildCheckpoint;
use crate::chunker::Chunker;
use crate::errors::IngestionError;
use crate::processor::IngestionProcessor;
use chrono::Utc;
use docqa_common::config::AppConfig;
use docqa_common::embeddings::Embedder;
use docqa_common::{DocumentStore, LocalVectorIndex, VectorIndex};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// How a rebuild ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The new index is live
    Completed { documents: usize, chunks: usize },
    /// Stopped between batches; the checkpoint allows resuming
    Cancelled { next_document: usize, chunks: usize },
}

pub struct IndexBuildJob {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    index_dir: PathBuf,
    batch_documents: usize,
    cancel: Arc<AtomicBool>,
}

impl IndexBuildJob {
    pub fn new(config: &AppConfig, embedder: Arc<dyn Embedder>) -> Result<Self, IngestionError> {
        Ok(Self {
            chunker: Chunker::new(&config.chunking)?,
            embedder,
            index_dir: config.index.directory.clone(),
            batch_documents: config.index.batch_documents.max(1),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that stops the build after the current batch
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn staging_dir(&self) -> Result<PathBuf, IngestionError> {
        sibling(&self.index_dir, ".building")
    }

    fn previous_dir(&self) -> Result<PathBuf, IngestionError> {
        sibling(&self.index_dir, ".previous")
    }

    /// Checkpoint of an unfinished build, if one exists
    pub fn pending_checkpoint(&self) -> Result<Option<BuildCheckpoint>, IngestionError> {
        BuildCheckpoint::load(&self.staging_dir()?)
    }

    /// Run (or resume) the rebuild; `fresh` discards any checkpoint
    #[instrument(skip(self, store), fields(documents = store.len(), index_dir = %self.index_dir.display()))]
    pub async fn run(&self, store: &DocumentStore, fresh: bool) -> Result<BuildOutcome, IngestionError> {
        let staging = self.staging_dir()?;
        let fingerprint = store.fingerprint();
        let documents = store.load();

        let resume = if fresh {
            None
        } else {
            match BuildCheckpoint::load(&staging) {
                Ok(Some(cp)) if cp.matches(&fingerprint) && cp.next_document <= documents.len() => Some(cp),
                Ok(Some(_)) => {
                    info!("Document set changed since last checkpoint, restarting build");
                    None
                }
                Ok(None) => None,
                Err(e) => {
                    warn!(error = %e, "Unreadable checkpoint, restarting build");
                    None
                }
            }
        };

        let resumed = match resume {
            Some(cp) => self.open_staging(&staging, &cp).await.map(|index| (index, cp)),
            None => None,
        };
        let (index, mut checkpoint) = match resumed {
            Some(resumed) => resumed,
            None => (
                LocalVectorIndex::create(&staging, self.embedder.clone())?,
                BuildCheckpoint::new(fingerprint.clone()),
            ),
        };
        checkpoint.save(&staging)?;

        let processor = IngestionProcessor::new(self.chunker.clone(), Arc::new(index));

        while checkpoint.next_document < documents.len() {
            let end = (checkpoint.next_document + self.batch_documents).min(documents.len());
            let batch = &documents[checkpoint.next_document..end];

            let chunks = processor.index_documents(batch, "rebuild").await?;
            processor.index().flush().await?;

            checkpoint.next_document = end;
            checkpoint.chunks_indexed += chunks;
            checkpoint.updated_at = Utc::now();
            checkpoint.save(&staging)?;

            info!(
                processed = end,
                total = documents.len(),
                chunks = checkpoint.chunks_indexed,
                "Index build progress"
            );

            if self.cancel.load(Ordering::SeqCst) && end < documents.len() {
                warn!(next_document = end, "Index build cancelled, checkpoint saved");
                return Ok(BuildOutcome::Cancelled {
                    next_document: end,
                    chunks: checkpoint.chunks_indexed,
                });
            }
        }

        processor.index().flush().await?;
        self.swap_into_place(&staging)?;

        info!(
            documents = documents.len(),
            chunks = checkpoint.chunks_indexed,
            "Index build complete"
        );
        Ok(BuildOutcome::Completed {
            documents: documents.len(),
            chunks: checkpoint.chunks_indexed,
        })
    }

    /// Staging index matching `checkpoint`, or None if the build must restart
    ///
    /// A crash between flushing a batch and saving the checkpoint leaves more
    /// chunks on disk than the checkpoint records; resuming would add that
    /// batch twice.
    async fn open_staging(&self, staging: &Path, checkpoint: &BuildCheckpoint) -> Option<LocalVectorIndex> {
        let index = match LocalVectorIndex::open(staging, self.embedder.clone()) {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "Staging index unusable, restarting build");
                return None;
            }
        };

        match index.count().await {
            Ok(chunks) if chunks == checkpoint.chunks_indexed => {
                info!(next_document = checkpoint.next_document, chunks = chunks, "Resuming index build");
                Some(index)
            }
            Ok(chunks) => {
                warn!(
                    on_disk = chunks,
                    checkpoint = checkpoint.chunks_indexed,
                    "Staging index does not match checkpoint, restarting build"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "Staging index unreadable, restarting build");
                None
            }
        }
    }

    fn swap_into_place(&self, staging: &Path) -> Result<(), IngestionError> {
        let previous = self.previous_dir()?;
        if previous.exists() {
            fs::remove_dir_all(&previous)?;
        }

        fs::remove_file(BuildCheckpoint::path(staging))?;

        if self.index_dir.exists() {
            fs::rename(&self.index_dir, &previous)?;
        }
        fs::rename(staging, &self.index_dir)?;

        if previous.exists() {
            fs::remove_dir_all(&previous)?;
        }
        Ok(())
    }
}

/// `dir` with `suffix` appended to its final component
fn sibling(dir: &Path, suffix: &str) -> Result<PathBuf, IngestionError> {
    let name = dir.file_name().ok_or_else(|| {
        IngestionError::ConfigError(format!("Index directory {} has no name", dir.display()))
    })?;
    let mut name = name.to_os_string();
    name.push(suffix);
    Ok(dir.with_file_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_common::embeddings::HashingEmbedder;
    use docqa_common::models::Document;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.index.directory = dir.path().join("tally_index");
        config.index.batch_documents = 2;
        config.store.docs_file = dir.path().join("docs.json");
        config
    }

    fn store_with(dir: &TempDir, count: usize) -> DocumentStore {
        let mut store = DocumentStore::open(dir.path().join("docs.json")).unwrap();
        for i in 0..count {
            store
                .append(Document::new(
                    format!("https://help/{}/", i),
                    format!("Page {}", i),
                    format!("Content of help page number {} about vouchers.", i),
                    "Help",
                ))
                .unwrap();
        }
        store
    }

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(HashingEmbedder::new(64))
    }

    #[test]
    fn test_sibling_paths() {
        let staging = sibling(Path::new("data/tally_index/"), ".building").unwrap();
        assert_eq!(staging, PathBuf::from("data/tally_index.building"));
    }

    #[tokio::test]
    async fn test_build_swaps_into_place() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let store = store_with(&dir, 5);

        let job = IndexBuildJob::new(&config, embedder()).unwrap();
        let outcome = job.run(&store, false).await.unwrap();
        assert_eq!(outcome, BuildOutcome::Completed { documents: 5, chunks: 5 });

        assert!(!job.staging_dir().unwrap().exists());
        assert!(!BuildCheckpoint::path(&config.index.directory).exists());
        let index = LocalVectorIndex::open(&config.index.directory, embedder()).unwrap();
        assert_eq!(index.count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_cancel_then_resume() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let store = store_with(&dir, 5);

        let job = IndexBuildJob::new(&config, embedder()).unwrap();
        job.cancel_flag().store(true, Ordering::SeqCst);
        let outcome = job.run(&store, false).await.unwrap();
        assert_eq!(outcome, BuildOutcome::Cancelled { next_document: 2, chunks: 2 });
        assert!(!config.index.directory.exists());

        let checkpoint = job.pending_checkpoint().unwrap().unwrap();
        assert_eq!(checkpoint.next_document, 2);

        let resumed = IndexBuildJob::new(&config, embedder()).unwrap();
        let outcome = resumed.run(&store, false).await.unwrap();
        assert_eq!(outcome, BuildOutcome::Completed { documents: 5, chunks: 5 });
    }

    #[tokio::test]
    async fn test_resume_restarts_when_staging_is_ahead_of_checkpoint() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let store = store_with(&dir, 5);

        let job = IndexBuildJob::new(&config, embedder()).unwrap();
        job.cancel_flag().store(true, Ordering::SeqCst);
        job.run(&store, false).await.unwrap();

        // Next batch flushed but its checkpoint never written
        let staging = LocalVectorIndex::open(job.staging_dir().unwrap(), embedder()).unwrap();
        let chunker = Chunker::new(&config.chunking).unwrap();
        let extra: Vec<_> = store.load()[2..4].iter().flat_map(|d| chunker.split(d)).collect();
        staging.add(extra).await.unwrap();
        staging.flush().await.unwrap();

        let resumed = IndexBuildJob::new(&config, embedder()).unwrap();
        let outcome = resumed.run(&store, false).await.unwrap();
        assert_eq!(outcome, BuildOutcome::Completed { documents: 5, chunks: 5 });

        let index = LocalVectorIndex::open(&config.index.directory, embedder()).unwrap();
        assert_eq!(index.count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_rebuild_is_not_overwritten_by_open_handle() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);

        let small = store_with(&dir, 1);
        IndexBuildJob::new(&config, embedder()).unwrap().run(&small, true).await.unwrap();
        let live = LocalVectorIndex::open(&config.index.directory, embedder()).unwrap();

        let large = store_with(&dir, 6);
        let outcome = IndexBuildJob::new(&config, embedder()).unwrap().run(&large, true).await.unwrap();
        assert_eq!(outcome, BuildOutcome::Completed { documents: 6, chunks: 6 });

        assert!(live.flush().await.is_err());
        let index = LocalVectorIndex::open(&config.index.directory, embedder()).unwrap();
        assert_eq!(index.count().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_changed_store_restarts() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let mut store = store_with(&dir, 4);

        let job = IndexBuildJob::new(&config, embedder()).unwrap();
        job.cancel_flag().store(true, Ordering::SeqCst);
        job.run(&store, false).await.unwrap();

        store
            .append(Document::new("https://help/new/", "New", "Fresh content here.", "Help"))
            .unwrap();

        let job = IndexBuildJob::new(&config, embedder()).unwrap();
        let outcome = job.run(&store, false).await.unwrap();
        assert_eq!(outcome, BuildOutcome::Completed { documents: 5, chunks: 5 });
    }

    #[tokio::test]
    async fn test_rebuild_replaces_existing_index() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);

        let store = store_with(&dir, 3);
        let job = IndexBuildJob::new(&config, embedder()).unwrap();
        job.run(&store, true).await.unwrap();
        job.run(&store, true).await.unwrap();

        let index = LocalVectorIndex::open(&config.index.directory, embedder()).unwrap();
        assert_eq!(index.count().await.unwrap(), 3);
        assert!(!dir.path().join("tally_index.previous").exists());
    }
}
