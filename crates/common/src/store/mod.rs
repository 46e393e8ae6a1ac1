//! JSON document store
//!
//! A flat ordered collection of scraped documents persisted as a pretty-printed
//! JSON array. The whole file is read on open and rewritten after each mutation
//! via a temporary sibling file and a rename. Single writer only.

use crate::errors::{AppError, Result};
use crate::models::Document;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct DocumentStore {
    path: PathBuf,
    documents: Vec<Document>,
    urls: HashSet<String>,
}

impl DocumentStore {
    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let loaded: Vec<Document> = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| AppError::Store {
                message: format!("Failed to read {}: {}", path.display(), e),
            })?;
            serde_json::from_str(&raw).map_err(|e| AppError::Store {
                message: format!("Invalid document file {}: {}", path.display(), e),
            })?
        } else {
            debug!(path = %path.display(), "Document file not found, starting empty");
            Vec::new()
        };

        let mut documents = Vec::with_capacity(loaded.len());
        let mut urls = HashSet::with_capacity(loaded.len());
        for doc in loaded {
            if urls.insert(doc.url.clone()) {
                documents.push(doc);
            } else {
                warn!(url = %doc.url, "Duplicate URL in document file, keeping first");
            }
        }

        info!(path = %path.display(), documents = documents.len(), "Document store opened");

        Ok(Self {
            path,
            documents,
            urls,
        })
    }

    /// All documents in insertion order
    pub fn load(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    pub fn get(&self, url: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.url == url)
    }

    /// Append a document and persist; returns false if the URL is already stored
    pub fn append(&mut self, doc: Document) -> Result<bool> {
        if self.urls.contains(&doc.url) {
            debug!(url = %doc.url, "Skipping duplicate document");
            return Ok(false);
        }

        self.urls.insert(doc.url.clone());
        self.documents.push(doc);

        if let Err(e) = self.persist() {
            // Keep memory consistent with disk
            if let Some(doc) = self.documents.pop() {
                self.urls.remove(&doc.url);
            }
            return Err(e);
        }
        Ok(true)
    }

    /// Append many documents with a single write; returns the ones accepted
    pub fn extend(&mut self, docs: impl IntoIterator<Item = Document>) -> Result<Vec<Document>> {
        let before = self.documents.len();
        let mut added = Vec::new();
        for doc in docs {
            if self.urls.insert(doc.url.clone()) {
                self.documents.push(doc.clone());
                added.push(doc);
            }
        }
        if added.is_empty() {
            return Ok(added);
        }

        if let Err(e) = self.persist() {
            self.documents.truncate(before);
            for doc in &added {
                self.urls.remove(&doc.url);
            }
            return Err(e);
        }
        Ok(added)
    }

    /// SHA-256 over the ordered URL list
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for doc in &self.documents {
            hasher.update(doc.url.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let body = serde_json::to_string_pretty(&self.documents)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|e| AppError::Store {
            message: format!("Failed to write {}: {}", tmp.display(), e),
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| AppError::Store {
            message: format!("Failed to replace {}: {}", self.path.display(), e),
        })?;

        debug!(path = %self.path.display(), documents = self.documents.len(), "Document store persisted");
        Ok(())
    }
}
