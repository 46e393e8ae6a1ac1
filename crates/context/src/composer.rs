//! Answer Composer - turns retrieved chunks into an Answer
//!
//! Provides:
//! - Context block formatting (retriever order is kept)
//! - The SHORT_ANSWER / LONG_ANSWER prompt
//! - Marker parsing with the lossy 300-character fallback
//! - Source list normalisation and video link detection
//!
//! `compose` never fails: model errors and timeouts become typed sentinels.

use docqa_common::config::ComposerConfig;
use docqa_common::errors::AppError;
use docqa_common::models::{Answer, AnswerStatus, ScoredChunk, SourceRef};
use docqa_common::ChatModel;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const SHORT_MARKER: &str = "SHORT_ANSWER:";
pub const LONG_MARKER: &str = "LONG_ANSWER:";

/// Characters kept as the short answer when the markers are missing
pub const FALLBACK_SHORT_CHARS: usize = 300;

const VIDEO_MARKERS: [&str; 3] = ["video", "youtube.com", "youtu.be"];

const INSTRUCTIONS: &str = "You are a Tally expert assistant.

Respond in this EXACT format:

SHORT_ANSWER:
A concise 2-3 line answer.

LONG_ANSWER:
A detailed explanation with steps and examples.
Use **bold** for Tally navigation paths.

RULES:
- Use ONLY the given context
- Do NOT mention sources inside answers";

pub struct AnswerComposer {
    model: Arc<dyn ChatModel>,
    timeout: Duration,
    max_sources: usize,
}

impl AnswerComposer {
    pub fn new(model: Arc<dyn ChatModel>, config: &ComposerConfig) -> Self {
        Self {
            model,
            timeout: Duration::from_secs(config.generation_timeout_secs),
            max_sources: config.max_sources,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Compose an answer to the raw question from retrieved chunks
    pub async fn compose(&self, question: &str, chunks: &[ScoredChunk]) -> Answer {
        if chunks.is_empty() {
            return Answer::no_results();
        }

        let prompt = build_prompt(question, &format_context(chunks));
        debug!(chunks = chunks.len(), prompt_chars = prompt.len(), "Calling chat model");

        let raw = match tokio::time::timeout(self.timeout, self.model.generate(&prompt)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(AppError::GenerationTimeout { timeout_ms })) => {
                warn!(timeout_ms = timeout_ms, "Chat model timed out");
                return Answer::timed_out();
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Chat model call failed");
                return Answer::generation_failed();
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Chat model timed out");
                return Answer::timed_out();
            }
        };

        let (short_answer, long_answer) = parse_response(&raw);
        let sources = collect_sources(chunks, self.max_sources);
        let video_links = video_links(&sources);

        Answer {
            short_answer,
            long_answer,
            watch_video: !video_links.is_empty(),
            video_links,
            sources,
            status: AnswerStatus::Answered,
        }
    }
}

/// `Title` / `Source` / content blocks separated by blank lines
pub fn format_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|c| {
            format!(
                "Title: {}\nSource: {}\n{}",
                c.chunk.title, c.chunk.source_url, c.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "{}\n\nContext:\n{}\n\nQuestion:\n{}\n",
        INSTRUCTIONS, context, question
    )
}

/// Split a model response into (short, long)
///
/// Short is the text after the first `SHORT_ANSWER:` up to the next marker of
/// either kind; long is the text after the first `LONG_ANSWER:` up to a repeated
/// `LONG_ANSWER:`. Without both markers the whole response is the long answer
/// and its first 300 characters the short one.
pub fn parse_response(raw: &str) -> (String, String) {
    if raw.contains(SHORT_MARKER) && raw.contains(LONG_MARKER) {
        let short = segment_after(raw, SHORT_MARKER);
        let short = short.split(LONG_MARKER).next().unwrap_or_default();
        let long = segment_after(raw, LONG_MARKER);
        return (short.trim().to_string(), long.trim().to_string());
    }

    let short: String = raw.chars().take(FALLBACK_SHORT_CHARS).collect();
    (short, raw.to_string())
}

/// Text between the first and second occurrence of `marker`
fn segment_after<'a>(raw: &'a str, marker: &str) -> &'a str {
    raw.split(marker).nth(1).unwrap_or_default()
}

/// Lower-cased URL without query string or fragment
pub fn normalize_source_url(url: &str) -> String {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    url[..end].to_lowercase()
}

/// First-seen unique sources in chunk order, capped at `max`
pub fn collect_sources(chunks: &[ScoredChunk], max: usize) -> Vec<SourceRef> {
    let mut seen = HashSet::new();
    chunks
        .iter()
        .filter_map(|c| {
            let url = normalize_source_url(&c.chunk.source_url);
            seen.insert(url.clone()).then(|| SourceRef {
                title: c.chunk.title.clone(),
                source_url: url,
            })
        })
        .take(max)
        .collect()
}

pub fn video_links(sources: &[SourceRef]) -> Vec<String> {
    sources
        .iter()
        .filter(|s| VIDEO_MARKERS.iter().any(|m| s.source_url.contains(m)))
        .map(|s| s.source_url.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docqa_common::models::Chunk;
    use docqa_common::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scored(url: &str, title: &str, text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                text: text.to_string(),
                source_url: url.to_string(),
                title: title.to_string(),
                category: String::new(),
                index: 0,
                start_offset: 0,
                end_offset: text.len(),
            },
            score: 0.9,
            rank: 0,
        }
    }

    enum Reply {
        Text(&'static str),
        Fail,
        Hang,
    }

    struct ScriptedModel {
        reply: Reply,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Reply::Text(text) => Ok(text.to_string()),
                Reply::Fail => Err(AppError::Generation {
                    message: "API error 500".into(),
                }),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(String::new())
                }
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    #[test]
    fn test_parse_both_markers() {
        let raw = "SHORT_ANSWER:\nGo to Gateway of Tally.\n\nLONG_ANSWER:\nStep 1. Open **Banking**.\nStep 2. Reconcile.";
        let (short, long) = parse_response(raw);
        assert_eq!(short, "Go to Gateway of Tally.");
        assert_eq!(long, "Step 1. Open **Banking**.\nStep 2. Reconcile.");
    }

    #[test]
    fn test_parse_repeated_markers() {
        let raw = "Intro SHORT_ANSWER: one LONG_ANSWER: two LONG_ANSWER: three";
        let (short, long) = parse_response(raw);
        assert_eq!(short, "one");
        assert_eq!(long, "two");
    }

    #[test]
    fn test_parse_without_markers() {
        let raw = "x".repeat(450);
        let (short, long) = parse_response(&raw);
        assert_eq!(short, "x".repeat(300));
        assert_eq!(long, raw);

        let (short, long) = parse_response("SHORT_ANSWER: only the short half");
        assert_eq!(short, "SHORT_ANSWER: only the short half");
        assert_eq!(long, "SHORT_ANSWER: only the short half");
    }

    #[test]
    fn test_normalize_source_url() {
        assert_eq!(
            normalize_source_url("https://Help.TallySolutions.com/Bank-Reco/?s=search&ref=1#top"),
            "https://help.tallysolutions.com/bank-reco/"
        );
        assert_eq!(normalize_source_url("pdf_docs/Manual.PDF"), "pdf_docs/manual.pdf");
    }

    #[test]
    fn test_collect_sources_dedups_and_caps() {
        let chunks: Vec<_> = (0..8)
            .map(|i| scored(&format!("https://help/{}/?ref={}", i % 6, i), &format!("T{}", i), "text"))
            .collect();
        let sources = collect_sources(&chunks, 5);
        let urls: Vec<_> = sources.iter().map(|s| s.source_url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://help/0/", "https://help/1/", "https://help/2/", "https://help/3/", "https://help/4/"]
        );
        assert_eq!(sources[0].title, "T0");
    }

    #[test]
    fn test_format_context_keeps_order() {
        let chunks = vec![
            scored("https://help/b/", "B", "second"),
            scored("https://help/a/", "A", "first"),
        ];
        assert_eq!(
            format_context(&chunks),
            "Title: B\nSource: https://help/b/\nsecond\n\nTitle: A\nSource: https://help/a/\nfirst"
        );
        let prompt = build_prompt("What is a voucher?", "ctx");
        assert!(prompt.contains("SHORT_ANSWER:"));
        assert!(prompt.ends_with("Context:\nctx\n\nQuestion:\nWhat is a voucher?\n"));
    }

    #[tokio::test]
    async fn test_compose_flags_videos() {
        let model = ScriptedModel::new(Reply::Text("SHORT_ANSWER: short LONG_ANSWER: long"));
        let composer = AnswerComposer::new(model.clone(), &ComposerConfig::default());
        let chunks = vec![
            scored("https://help/gst/", "GST", "gst"),
            scored("https://www.youtube.com/watch?v=abc", "Walkthrough", "video"),
        ];

        let answer = composer.compose("gst?", &chunks).await;
        assert_eq!(answer.status, AnswerStatus::Answered);
        assert_eq!(answer.short_answer, "short");
        assert!(answer.watch_video);
        assert_eq!(answer.video_links, vec!["https://www.youtube.com/watch".to_string()]);
    }

    #[test]
    fn test_compose_without_chunks_skips_model() {
        let model = ScriptedModel::new(Reply::Text("unused"));
        let composer = AnswerComposer::new(model.clone(), &ComposerConfig::default());
        let answer = tokio_test::block_on(composer.compose("anything", &[]));
        assert_eq!(answer, Answer::no_results());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_compose_generation_failure() {
        let composer = AnswerComposer::new(ScriptedModel::new(Reply::Fail), &ComposerConfig::default());
        let answer = composer.compose("q", &[scored("https://help/a/", "A", "a")]).await;
        assert_eq!(answer, Answer::generation_failed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_compose_times_out() {
        let composer = AnswerComposer::new(ScriptedModel::new(Reply::Hang), &ComposerConfig::default());
        let answer = composer.compose("q", &[scored("https://help/a/", "A", "a")]).await;
        assert_eq!(answer.status, AnswerStatus::TimedOut);
        assert!(answer.sources.is_empty());
    }
}
