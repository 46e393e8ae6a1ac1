//! Text chunking module
//!
//! `text-splitter` cuts the text into small pieces along its semantic levels
//! (paragraphs, lines, sentences, words, then characters); pieces are then
//! packed greedily into chunks of at most `chunk_size` characters. Each chunk
//! after the first starts at the shortest run of trailing pieces of its
//! predecessor that covers `chunk_overlap` characters.
//!
//! Pieces are capped at `(chunk_size - chunk_overlap) / 2` characters, which
//! is what lets every chunk honour both the size limit and the overlap.
//! Pieces are untrimmed and contiguous, so chunks are exact byte spans of the
//! source and `reassemble` reproduces it.

use crate::errors::IngestionError;
use docqa_common::config::ChunkingConfig;
use docqa_common::models::{Chunk, Document};
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

/// Contiguous span of the source text
#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    chars: usize,
}

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    piece_limit: usize,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Result<Self, IngestionError> {
        if config.chunk_size == 0 {
            return Err(IngestionError::ChunkingError(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(IngestionError::ChunkingError(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }

        Ok(Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            piece_limit: ((config.chunk_size - config.chunk_overlap) / 2).max(1),
        })
    }

    /// Lazily split a document into chunks
    pub fn split<'a>(&'a self, doc: &'a Document) -> Chunks<'a> {
        let pieces = self.pieces(&doc.content);
        debug!(
            url = %doc.url,
            input_len = doc.content.len(),
            pieces = pieces.len(),
            chunk_size = self.chunk_size,
            "Text split into pieces"
        );

        Chunks {
            chunker: self,
            doc,
            pieces,
            next_piece: 0,
            next_index: 0,
        }
    }

    /// Contiguous pieces covering `text`, none longer than `piece_limit`
    fn pieces(&self, text: &str) -> Vec<Piece> {
        let splitter = TextSplitter::new(ChunkConfig::new(self.piece_limit).with_trim(false));
        let mut starts: Vec<usize> = splitter
            .chunk_indices(text)
            .map(|(offset, _)| offset)
            .filter(|&offset| offset > 0 && offset < text.len())
            .collect();
        starts.dedup();

        let mut pieces = Vec::with_capacity(starts.len() + 1);
        let mut start = 0;
        for end in starts.into_iter().chain(std::iter::once(text.len())) {
            if end > start {
                self.push_span(text, start, end, &mut pieces);
                start = end;
            }
        }
        pieces
    }

    /// Push a span, falling back to raw characters when it exceeds the limit
    fn push_span(&self, text: &str, start: usize, end: usize, out: &mut Vec<Piece>) {
        let span = &text[start..end];
        let chars = span.chars().count();
        if chars <= self.piece_limit {
            out.push(Piece { start, end, chars });
            return;
        }

        let mut piece_start = 0;
        let mut count = 0;
        for (pos, _) in span.char_indices() {
            if count == self.piece_limit {
                out.push(Piece {
                    start: start + piece_start,
                    end: start + pos,
                    chars: count,
                });
                piece_start = pos;
                count = 0;
            }
            count += 1;
        }
        if count > 0 {
            out.push(Piece {
                start: start + piece_start,
                end,
                chars: count,
            });
        }
    }
}

/// Iterator over the chunks of one document
pub struct Chunks<'a> {
    chunker: &'a Chunker,
    doc: &'a Document,
    pieces: Vec<Piece>,
    next_piece: usize,
    next_index: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let pieces = &self.pieces;
        let first = self.next_piece;
        if first >= pieces.len() {
            return None;
        }

        let mut last = first;
        let mut len = 0;
        while last < pieces.len() && len + pieces[last].chars <= self.chunker.chunk_size {
            len += pieces[last].chars;
            last += 1;
        }

        if last == pieces.len() {
            self.next_piece = last;
        } else {
            // Shortest trailing run covering the overlap; never the whole chunk
            let mut back = last;
            let mut overlap = 0;
            while overlap < self.chunker.chunk_overlap && back > first + 1 {
                back -= 1;
                overlap += pieces[back].chars;
            }
            self.next_piece = back;
        }

        let start_offset = pieces[first].start;
        let end_offset = pieces[last - 1].end;
        let index = self.next_index;
        self.next_index += 1;

        Some(Chunk {
            text: self.doc.content[start_offset..end_offset].to_string(),
            source_url: self.doc.url.clone(),
            title: self.doc.title.clone(),
            category: self.doc.category.clone(),
            index,
            start_offset,
            end_offset,
        })
    }
}

/// Rebuild the source text from consecutive chunks of one document
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    let mut covered: usize = 0;
    for (i, chunk) in chunks.iter().enumerate() {
        let skip = if i == 0 {
            0
        } else {
            covered.saturating_sub(chunk.start_offset).min(chunk.text.len())
        };
        text.push_str(&chunk.text[skip..]);
        covered = chunk.end_offset;
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, chunk_overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            chunk_overlap,
            ..ChunkingConfig::default()
        }
    }

    fn doc(content: &str) -> Document {
        Document::new("https://help.example.com/page/", "Page", content, "Test")
    }

    fn shared_chars(prev: &Chunk, next: &Chunk, content: &str) -> usize {
        if next.start_offset >= prev.end_offset {
            0
        } else {
            content[next.start_offset..prev.end_offset].chars().count()
        }
    }

    fn check_laws(content: &str, chunk_size: usize, chunk_overlap: usize) {
        let chunker = Chunker::new(&config(chunk_size, chunk_overlap)).unwrap();
        let d = doc(content);
        let chunks: Vec<Chunk> = chunker.split(&d).collect();

        assert_eq!(reassemble(&chunks), content);
        for chunk in &chunks {
            assert!(chunk.char_len() <= chunk_size, "chunk too long: {}", chunk.char_len());
            assert_eq!(&content[chunk.start_offset..chunk.end_offset], chunk.text);
        }
        for pair in chunks.windows(2) {
            assert!(shared_chars(&pair[0], &pair[1], content) >= chunk_overlap);
            assert!(pair[1].end_offset > pair[0].end_offset);
        }
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        assert!(matches!(
            Chunker::new(&config(100, 100)),
            Err(IngestionError::ChunkingError(_))
        ));
        assert!(Chunker::new(&config(0, 0)).is_err());
    }

    #[test]
    fn test_empty_text() {
        let chunker = Chunker::new(&ChunkingConfig::default()).unwrap();
        let d = doc("");
        assert_eq!(chunker.split(&d).count(), 0);
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunker = Chunker::new(&ChunkingConfig::default()).unwrap();
        let d = doc("Go to Gateway of Tally > Banking > Bank Reconciliation.");
        let chunks: Vec<_> = chunker.split(&d).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, d.content);
        assert_eq!(chunks[0].title, "Page");
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let para = "Ledger creation steps are listed here. ".repeat(3);
        let content = format!("{}\n\n{}\n\n{}", para.trim(), para.trim(), para.trim());
        let chunker = Chunker::new(&config(300, 50)).unwrap();
        let d = doc(&content);
        let chunks: Vec<_> = chunker.split(&d).collect();
        assert!(chunks.len() >= 2);
        assert!(chunks[0].text.trim_end().ends_with("listed here."));
    }

    #[test]
    fn test_laws_on_prose() {
        let content = "Tally Prime supports GST returns. Create a ledger under Duties & Taxes.\n\
            Set the type of duty to GST.\n\nTo file GSTR-1, open the return and export it. \
            Reconcile the books before filing. "
            .repeat(25);
        check_laws(&content, 1000, 200);
        check_laws(&content, 120, 30);
        check_laws(&content, 50, 0);
    }

    #[test]
    fn test_laws_on_unbroken_text() {
        let content = "x".repeat(2500);
        check_laws(&content, 1000, 200);
        check_laws(&content, 2, 1);
    }

    #[test]
    fn test_laws_on_multibyte_text() {
        let content = "लेजर बनाएँ और जीएसटी सेट करें। ₹ राशि दर्ज करें।\n".repeat(40);
        check_laws(&content, 100, 20);
    }

    #[test]
    fn test_deterministic() {
        let content = "Stock item reorder levels. ".repeat(100);
        let chunker = Chunker::new(&config(200, 40)).unwrap();
        let d = doc(&content);
        let a: Vec<_> = chunker.split(&d).collect();
        let b: Vec<_> = chunker.split(&d).collect();
        assert_eq!(a, b);
        assert!(a.iter().enumerate().all(|(i, c)| c.index == i));
    }
}
