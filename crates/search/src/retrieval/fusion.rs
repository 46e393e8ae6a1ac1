//! Pool merging for hybrid retrieval
//!
//! Chunks are deduplicated by a content-prefix fingerprint: the first
//! `dedup_prefix_chars` characters of the chunk text. Two chunks from
//! different documents that open with the same text are treated as one.
//! The prefix length is the knob for that trade-off.

use docqa_common::config::{RetrievalConfig, SourcePriority};
use docqa_common::models::{ScoredChunk, SourceKind};
use std::collections::HashSet;

/// Dedup fingerprint: the first `prefix_chars` characters of the text
pub fn dedup_key(text: &str, prefix_chars: usize) -> &str {
    match text.char_indices().nth(prefix_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Merge parameters
#[derive(Debug, Clone)]
pub struct PriorityMerge {
    /// Fingerprint length in characters
    pub dedup_prefix_chars: usize,

    /// Source class filled first
    pub priority: SourceKind,

    /// Cap for the prioritised class
    pub primary_cap: usize,

    /// Cap for both classes together
    pub total_cap: usize,

    /// Final truncation before handing chunks to the composer
    pub context_limit: usize,
}

impl Default for PriorityMerge {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

impl PriorityMerge {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            dedup_prefix_chars: config.dedup_prefix_chars,
            priority: match config.priority {
                SourcePriority::Web => SourceKind::Web,
                SourcePriority::Pdf => SourceKind::Pdf,
            },
            primary_cap: config.primary_cap,
            total_cap: config.total_cap,
            context_limit: config.context_limit,
        }
    }

    /// Merge a pooled result list into at most `min(context_limit, k)` chunks
    ///
    /// Pool order is preserved within each class. The prioritised class is
    /// taken first up to `primary_cap`; the other class then fills the list up
    /// to `total_cap`. A fingerprint seen once is never admitted again, across
    /// both classes. Ranks are renumbered from 0.
    pub fn merge(&self, pool: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut taken = vec![false; pool.len()];
        let mut order: Vec<usize> = Vec::with_capacity(self.total_cap.min(pool.len()));

        let primary_cap = self.primary_cap.min(self.total_cap);
        for (i, candidate) in pool.iter().enumerate() {
            if order.len() >= primary_cap {
                break;
            }
            if candidate.kind() != self.priority {
                continue;
            }
            let key = dedup_key(&candidate.chunk.text, self.dedup_prefix_chars);
            if seen.insert(key.to_string()) {
                order.push(i);
                taken[i] = true;
            }
        }

        for (i, candidate) in pool.iter().enumerate() {
            if order.len() >= self.total_cap {
                break;
            }
            if taken[i] || candidate.kind() == self.priority {
                continue;
            }
            let key = dedup_key(&candidate.chunk.text, self.dedup_prefix_chars);
            if seen.insert(key.to_string()) {
                order.push(i);
            }
        }

        order.truncate(self.context_limit.min(k));

        let mut slots: Vec<Option<ScoredChunk>> = pool.into_iter().map(Some).collect();
        order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .enumerate()
            .map(|(rank, mut chunk)| {
                chunk.rank = rank;
                chunk
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_common::models::Chunk;

    fn scored(url: &str, text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                text: text.to_string(),
                source_url: url.to_string(),
                title: url.to_string(),
                category: String::new(),
                index: 0,
                start_offset: 0,
                end_offset: text.len(),
            },
            score: 0.5,
            rank: 0,
        }
    }

    #[test]
    fn test_dedup_key_counts_characters() {
        assert_eq!(dedup_key("héllo world", 5), "héllo");
        assert_eq!(dedup_key("short", 200), "short");
    }

    #[test]
    fn test_web_first_then_pdf() {
        let merge = PriorityMerge::default();
        let pool = vec![
            scored("manual.pdf", "pdf one"),
            scored("https://a/", "web one"),
            scored("manual.pdf", "pdf two"),
            scored("https://b/", "web two"),
        ];
        let merged = merge.merge(pool, 15);
        let texts: Vec<_> = merged.iter().map(|c| c.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["web one", "web two", "pdf one", "pdf two"]);
        let ranks: Vec<_> = merged.iter().map(|c| c.rank).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_pdf_priority() {
        let merge = PriorityMerge {
            priority: SourceKind::Pdf,
            ..PriorityMerge::default()
        };
        let pool = vec![scored("https://a/", "web"), scored("b.PDF", "pdf")];
        let merged = merge.merge(pool, 15);
        assert_eq!(merged[0].chunk.text, "pdf");
    }

    #[test]
    fn test_prefix_collision_conflates_chunks() {
        let merge = PriorityMerge {
            dedup_prefix_chars: 10,
            ..PriorityMerge::default()
        };
        let pool = vec![
            scored("https://a/", "Go to Gateway of Tally > Create"),
            scored("https://b/", "Go to Gateway of Tally > Alter"),
            scored("guide.pdf", "Go to Gateway in the PDF"),
        ];
        let merged = merge.merge(pool, 15);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].chunk.source_url, "https://a/");
    }

    #[test]
    fn test_caps_and_truncation() {
        let merge = PriorityMerge::default();
        let mut pool: Vec<ScoredChunk> = (0..30)
            .map(|i| scored(&format!("https://w{}/", i), &format!("web chunk {}", i)))
            .collect();
        pool.extend((0..30).map(|i| scored("m.pdf", &format!("pdf chunk {}", i))));

        let merged = merge.merge(pool.clone(), 100);
        assert_eq!(merged.len(), 15);
        assert_eq!(
            merged.iter().filter(|c| c.kind() == SourceKind::Web).count(),
            12
        );

        let small = merge.merge(pool, 5);
        assert_eq!(small.len(), 5);
        assert!(small.iter().all(|c| c.kind() == SourceKind::Web));
    }

    #[test]
    fn test_other_class_fills_when_priority_is_short() {
        let merge = PriorityMerge {
            context_limit: 50,
            ..PriorityMerge::default()
        };
        let mut pool = vec![scored("https://a/", "only web")];
        pool.extend((0..30).map(|i| scored("m.pdf", &format!("pdf chunk {}", i))));
        let merged = merge.merge(pool, 50);
        assert_eq!(merged.len(), 20);
    }

    #[test]
    fn test_no_duplicate_fingerprints() {
        let merge = PriorityMerge::default();
        let pool = vec![
            scored("https://a/", "same text"),
            scored("https://a/", "same text"),
            scored("x.pdf", "same text"),
        ];
        let merged = merge.merge(pool, 10);
        assert_eq!(merged.len(), 1);
    }
}
