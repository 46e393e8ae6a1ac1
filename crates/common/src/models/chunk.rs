//! Chunk entities

use serde::{Deserialize, Serialize};

/// Source class of a chunk, derived from its URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Web,
    Pdf,
}

impl SourceKind {
    pub fn from_url(url: &str) -> Self {
        if url.to_lowercase().ends_with(".pdf") {
            SourceKind::Pdf
        } else {
            SourceKind::Web
        }
    }
}

/// A bounded span of a document's content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,

    /// URL of the parent document
    pub source_url: String,

    pub title: String,

    #[serde(default)]
    pub category: String,

    /// Position within the parent document
    #[serde(default)]
    pub index: usize,

    /// Byte offset of the first character in the parent content
    #[serde(default)]
    pub start_offset: usize,

    /// Byte offset one past the last character
    #[serde(default)]
    pub end_offset: usize,
}

impl Chunk {
    pub fn kind(&self) -> SourceKind {
        SourceKind::from_url(&self.source_url)
    }

    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A chunk returned by a similarity query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    #[serde(flatten)]
    pub chunk: Chunk,

    /// Cosine similarity to the query
    pub score: f32,

    /// Position in the result list (0 = best)
    pub rank: usize,
}

impl ScoredChunk {
    pub fn kind(&self) -> SourceKind {
        self.chunk.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_from_url() {
        assert_eq!(SourceKind::from_url("manuals/GST_Guide.PDF"), SourceKind::Pdf);
        assert_eq!(
            SourceKind::from_url("https://help.example.com/gst/"),
            SourceKind::Web
        );
        assert_eq!(
            SourceKind::from_url("https://help.example.com/file.pdf?x=1"),
            SourceKind::Web
        );
    }
}
