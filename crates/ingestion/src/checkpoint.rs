//! Rebuild progress record
//!
//! Written to `checkpoint.json` inside the staging index directory after
//! every batch so an interrupted rebuild can resume.

use crate::errors::IngestionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CHECKPOINT_FILE_NAME: &str = "checkpoint.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildCheckpoint {
    /// Fingerprint of the document set being indexed
    pub store_fingerprint: String,

    /// Index of the first document not yet indexed
    pub next_document: usize,

    /// Chunks written to the staging index so far
    pub chunks_indexed: usize,

    pub updated_at: DateTime<Utc>,
}

impl BuildCheckpoint {
    pub fn new(store_fingerprint: impl Into<String>) -> Self {
        Self {
            store_fingerprint: store_fingerprint.into(),
            next_document: 0,
            chunks_indexed: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn path(dir: &Path) -> PathBuf {
        dir.join(CHECKPOINT_FILE_NAME)
    }

    /// Load the checkpoint in `dir`, if any
    pub fn load(dir: &Path) -> Result<Option<Self>, IngestionError> {
        let path = Self::path(dir);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| IngestionError::CheckpointError(format!("{}: {}", path.display(), e)))
    }

    /// Persist via a temporary file and rename
    pub fn save(&self, dir: &Path) -> Result<(), IngestionError> {
        let path = Self::path(dir);
        let tmp = dir.join(format!("{}.tmp", CHECKPOINT_FILE_NAME));
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Whether this checkpoint can resume a build of the given document set
    pub fn matches(&self, store_fingerprint: &str) -> bool {
        self.store_fingerprint == store_fingerprint
    }
}
