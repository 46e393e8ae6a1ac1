//! In-process answer cache
//!
//! Bounded LRU keyed by a SHA-256 digest of the normalised question. Entries
//! are only evicted by capacity; an index rebuild does not invalidate them.

use crate::metrics;
use crate::models::Answer;
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use tokio::sync::Mutex;
use tracing::debug;

pub struct AnswerCache {
    entries: Mutex<LruCache<String, Answer>>,
}

impl AnswerCache {
    /// Returns `None` when `capacity` is 0 (cache disabled)
    pub fn new(capacity: usize) -> Option<Self> {
        NonZeroUsize::new(capacity).map(|capacity| Self {
            entries: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Cache key for a question: trimmed, lower-cased, hashed
    pub fn key(question: &str) -> String {
        let normalised = question.trim().to_lowercase();
        hex::encode(Sha256::digest(normalised.as_bytes()))
    }

    pub async fn get(&self, question: &str) -> Option<Answer> {
        let key = Self::key(question);
        let hit = self.entries.lock().await.get(&key).cloned();
        match hit {
            Some(answer) => {
                debug!(key = %key, "Answer cache hit");
                metrics::record_cache_hit();
                Some(answer)
            }
            None => {
                metrics::record_cache_miss();
                None
            }
        }
    }

    pub async fn put(&self, question: &str, answer: Answer) {
        self.entries.lock().await.put(Self::key(question), answer);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
