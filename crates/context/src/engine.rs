//! QA engine: the application context shared by every caller
//!
//! Owns the router, the retriever, the composer, the answer cache and the
//! optional discovery pass. Built once at startup and shared behind `Arc`.

use crate::composer::AnswerComposer;
use docqa_common::cache::AnswerCache;
use docqa_common::config::AppConfig;
use docqa_common::errors::{AppError, Result};
use docqa_common::metrics;
use docqa_common::models::Answer;
use docqa_common::{ChatModel, DocumentStore, VectorIndex};
use docqa_ingestion::{Chunker, Discovery, HttpPageFetcher, IngestionProcessor};
use docqa_search::{HybridRetriever, QueryRouter, Retriever};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub struct QaEngine {
    router: QueryRouter,
    retriever: Arc<dyn Retriever>,
    composer: AnswerComposer,
    cache: Option<AnswerCache>,
    discovery: Option<Discovery>,
}

impl QaEngine {
    pub fn new(router: QueryRouter, retriever: Arc<dyn Retriever>, composer: AnswerComposer) -> Self {
        Self {
            router,
            retriever,
            composer,
            cache: None,
            discovery: None,
        }
    }

    pub fn with_cache(mut self, cache: Option<AnswerCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_discovery(mut self, discovery: Discovery) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Wire the full pipeline from configuration around an opened index
    pub fn from_config(
        config: &AppConfig,
        index: Arc<dyn VectorIndex>,
        model: Arc<dyn ChatModel>,
    ) -> Result<Self> {
        let router = QueryRouter::new(&config.routing);
        let retriever = Arc::new(HybridRetriever::new(index.clone(), &config.retrieval));
        let composer = AnswerComposer::new(model, &config.composer);

        let mut engine =
            Self::new(router, retriever, composer).with_cache(AnswerCache::new(config.cache.capacity));

        if config.discovery.enabled {
            let configuration = |e: docqa_ingestion::IngestionError| AppError::Configuration {
                message: format!("Discovery setup failed: {}", e),
            };
            let store = DocumentStore::open(&config.store.docs_file)?;
            let chunker = Chunker::new(&config.chunking).map_err(configuration)?;
            let fetcher =
                HttpPageFetcher::new(config.discovery.fetch_timeout_secs).map_err(configuration)?;
            let discovery = Discovery::new(
                config.discovery.clone(),
                Arc::new(fetcher),
                Arc::new(IngestionProcessor::new(chunker, index)),
                Arc::new(Mutex::new(store)),
            )
            .map_err(configuration)?;
            info!(url_list = %config.discovery.url_list.display(), "On-demand discovery enabled");
            engine = engine.with_discovery(discovery);
        }

        Ok(engine)
    }

    pub fn model_name(&self) -> &str {
        self.composer.model_name()
    }

    /// Answer a question; never fails, unexpected panics become a sentinel
    pub async fn ask(&self, question: &str) -> Answer {
        let started = Instant::now();
        let (answer, chunks) = match AssertUnwindSafe(self.answer(question)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                error!("Question pipeline panicked");
                (Answer::internal_error(), 0)
            }
        };

        let elapsed = started.elapsed();
        metrics::record_ask(elapsed.as_secs_f64(), answer.status.as_str(), chunks);
        info!(
            status = answer.status.as_str(),
            chunks = chunks,
            sources = answer.sources.len(),
            latency_ms = elapsed.as_millis() as u64,
            "Question answered"
        );
        answer
    }

    async fn answer(&self, question: &str) -> (Answer, usize) {
        let question = question.trim();
        if question.is_empty() {
            return (Answer::no_results(), 0);
        }

        if let Some(cache) = &self.cache {
            if let Some(answer) = cache.get(question).await {
                return (answer, 0);
            }
        }

        if let Some(discovery) = &self.discovery {
            match discovery.discover(question).await {
                Ok(report) if !report.ingested.is_empty() => {
                    info!(pages = report.ingested.len(), chunks = report.chunks, "Discovery added pages");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Discovery failed, answering from the existing index"),
            }
        }

        let routed = self.router.classify(question);
        debug!(query = %routed.query, k = routed.k, rules = ?routed.matched, "Question routed");

        let chunks = self.retriever.retrieve(&routed.query, routed.k).await;
        let answer = self.composer.compose(question, &chunks).await;

        if answer.is_answered() {
            if let Some(cache) = &self.cache {
                cache.put(question, answer.clone()).await;
            }
        }
        (answer, chunks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docqa_common::config::ComposerConfig;
    use docqa_common::models::{AnswerStatus, Chunk, ScoredChunk};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedRetriever {
        queries: std::sync::Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn retrieve(&self, query: &str, k: usize) -> Vec<ScoredChunk> {
            self.queries.lock().unwrap().push((query.to_string(), k));
            vec![ScoredChunk {
                chunk: Chunk {
                    text: "Enable GST in F11 features.".into(),
                    source_url: "https://help/gst/".into(),
                    title: "GST Setup".into(),
                    category: "GST".into(),
                    index: 0,
                    start_offset: 0,
                    end_offset: 27,
                },
                score: 0.8,
                rank: 1,
            }]
        }
    }

    struct PanickingRetriever;

    #[async_trait]
    impl Retriever for PanickingRetriever {
        async fn retrieve(&self, _query: &str, _k: usize) -> Vec<ScoredChunk> {
            panic!("index poisoned");
        }
    }

    struct CountingModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatModel for CountingModel {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("SHORT_ANSWER: Press F11. LONG_ANSWER: Open **F11: Features** and enable GST.".into())
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    fn engine(retriever: Arc<dyn Retriever>, model: Arc<CountingModel>) -> QaEngine {
        QaEngine::new(
            QueryRouter::default(),
            retriever,
            AnswerComposer::new(model, &ComposerConfig::default()),
        )
        .with_cache(AnswerCache::new(8))
    }

    #[tokio::test]
    async fn test_routes_rewritten_query_and_caches() {
        let retriever = Arc::new(FixedRetriever {
            queries: std::sync::Mutex::new(Vec::new()),
        });
        let model = Arc::new(CountingModel {
            calls: AtomicUsize::new(0),
        });
        let engine = engine(retriever.clone(), model.clone());

        let first = engine.ask("How do I enable GST?").await;
        assert_eq!(first.status, AnswerStatus::Answered);
        assert_eq!(first.short_answer, "Press F11.");

        let second = engine.ask("  how do i enable gst?  ").await;
        assert_eq!(second, first);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);

        let queries = retriever.queries.lock().unwrap();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].0.starts_with("How do I enable GST?"));
        assert!(queries[0].0.contains("GSTR"));
        assert_eq!(queries[0].1, 35);
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error() {
        let model = Arc::new(CountingModel {
            calls: AtomicUsize::new(0),
        });
        let engine = engine(Arc::new(PanickingRetriever), model);
        let answer = engine.ask("stock summary").await;
        assert_eq!(answer, Answer::internal_error());
    }

    #[tokio::test]
    async fn test_blank_question() {
        let model = Arc::new(CountingModel {
            calls: AtomicUsize::new(0),
        });
        let engine = engine(Arc::new(PanickingRetriever), model.clone());
        assert_eq!(engine.ask("   ").await.status, AnswerStatus::NoResults);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }
}
