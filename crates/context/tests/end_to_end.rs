//! Whole-pipeline tests: store, rebuild job, index, router, retriever, composer

use async_trait::async_trait;
use docqa_common::config::AppConfig;
use docqa_common::embeddings::create_embedder;
use docqa_common::errors::AppError;
use docqa_common::models::{Answer, AnswerStatus, Chunk, Document, ScoredChunk};
use docqa_common::{ChatModel, DocumentStore, LocalVectorIndex, Result, VectorIndex};
use docqa_context::{AnswerComposer, QaEngine};
use docqa_ingestion::discovery::{FetchedPage, PageFetcher};
use docqa_ingestion::{
    BuildOutcome, Chunker, Discovery, IndexBuildJob, IngestionError, IngestionProcessor,
};
use docqa_search::{HybridRetriever, QueryRouter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;

struct FakeModel {
    calls: AtomicUsize,
}

impl FakeModel {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ChatModel for FakeModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(prompt.contains("Context:\nTitle: "));
        Ok("SHORT_ANSWER:\nUse Banking > Bank Reconciliation.\n\nLONG_ANSWER:\n1. Open the bank ledger.\n2. Enter the bank dates.".into())
    }

    fn model_name(&self) -> &str {
        "fake"
    }
}

struct FailingIndex;

#[async_trait]
impl VectorIndex for FailingIndex {
    async fn similarity_search(&self, _query: &str, _k: usize) -> Result<Vec<ScoredChunk>> {
        Err(AppError::Index {
            message: "index unavailable".into(),
        })
    }

    async fn max_marginal_relevance_search(
        &self,
        query: &str,
        k: usize,
        _fetch_k: usize,
        _lambda: f32,
    ) -> Result<Vec<ScoredChunk>> {
        self.similarity_search(query, k).await
    }

    async fn add(&self, _chunks: Vec<Chunk>) -> Result<usize> {
        Err(AppError::Index {
            message: "index unavailable".into(),
        })
    }

    async fn count(&self) -> Result<usize> {
        Ok(0)
    }

    async fn contains_source(&self, _url: &str) -> Result<bool> {
        Ok(false)
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

fn config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.store.docs_file = dir.path().join("tally_docs.json");
    config.index.directory = dir.path().join("tally_index");
    config.embedding.provider = "hashing".into();
    config
}

async fn build_corpus(config: &AppConfig) -> Arc<dyn VectorIndex> {
    let mut store = DocumentStore::open(&config.store.docs_file).unwrap();
    store
        .extend([
            Document::new(
                "https://help.tallysolutions.com/bank-reconciliation/",
                "Bank Reconciliation Procedures",
                "How to reconcile your bank statement: open the bank ledger, compare each \
                 statement entry and record the bank date for every cleared transaction.",
                "Banking",
            ),
            Document::new(
                "https://help.tallysolutions.com/gstr-1/",
                "GSTR-1 Returns",
                "GST returns are filed from the GSTR-1 report after checking uncertain transactions.",
                "GST",
            ),
            Document::new(
                "https://help.tallysolutions.com/stock-summary/",
                "Stock Summary",
                "Stock summary shows closing quantities and values of items per godown.",
                "Inventory",
            ),
        ])
        .unwrap();

    let embedder = create_embedder(&config.embedding).unwrap();
    let job = IndexBuildJob::new(config, embedder.clone()).unwrap();
    let outcome = job.run(&store, true).await.unwrap();
    assert_eq!(outcome, BuildOutcome::Completed { documents: 3, chunks: 3 });

    Arc::new(LocalVectorIndex::open(&config.index.directory, embedder).unwrap())
}

#[tokio::test]
async fn bank_reconciliation_question_cites_its_page() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let index = build_corpus(&config).await;
    let model = FakeModel::new();

    let engine = QaEngine::from_config(&config, index, model.clone()).unwrap();
    let answer = engine.ask("How do I reconcile my bank statement?").await;

    assert_eq!(answer.status, AnswerStatus::Answered);
    assert_eq!(answer.short_answer, "Use Banking > Bank Reconciliation.");
    assert_eq!(answer.long_answer, "1. Open the bank ledger.\n2. Enter the bank dates.");
    assert!(!answer.sources.is_empty());
    assert_eq!(answer.sources[0].title, "Bank Reconciliation Procedures");
    assert!(!answer.watch_video);
    assert!(answer.video_links.is_empty());
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_index_yields_no_results_sentinel() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let model = FakeModel::new();

    let engine = QaEngine::from_config(&config, Arc::new(FailingIndex), model.clone()).unwrap();
    let answer = engine.ask("How do I reconcile my bank statement?").await;

    assert_eq!(answer, Answer::no_results());
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

struct StaticFetcher;

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, IngestionError> {
        Ok(FetchedPage {
            url: url.to_string(),
            title: "Reverse Charge Mechanism".to_string(),
            content: "RCM purchases are recorded with a journal voucher and the reverse charge \
                      liability is booked under GST. Set the RCM option in the party ledger \
                      before recording the purchase."
                .to_string(),
        })
    }
}

#[tokio::test]
async fn discovery_adds_missing_pages_before_retrieval() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    let index = build_corpus(&config).await;

    config.discovery.enabled = true;
    config.discovery.url_list = dir.path().join("tally-site-urls.txt");
    std::fs::write(
        &config.discovery.url_list,
        "https://help.tallysolutions.com/rcm-purchase/\nhttps://help.tallysolutions.com/stock-summary/\n",
    )
    .unwrap();

    let store = Arc::new(Mutex::new(DocumentStore::open(&config.store.docs_file).unwrap()));
    let processor = Arc::new(IngestionProcessor::new(
        Chunker::new(&config.chunking).unwrap(),
        index.clone(),
    ));
    let discovery = Discovery::new(
        config.discovery.clone(),
        Arc::new(StaticFetcher),
        processor,
        store.clone(),
    )
    .unwrap();

    let engine = QaEngine::new(
        QueryRouter::new(&config.routing),
        Arc::new(HybridRetriever::new(index.clone(), &config.retrieval)),
        AnswerComposer::new(FakeModel::new(), &config.composer),
    )
    .with_discovery(discovery);

    let answer = engine.ask("How do I pass an RCM entry?").await;

    assert_eq!(answer.status, AnswerStatus::Answered);
    assert!(answer
        .sources
        .iter()
        .any(|s| s.source_url == "https://help.tallysolutions.com/rcm-purchase/"));
    assert_eq!(index.count().await.unwrap(), 4);
    assert_eq!(store.lock().await.len(), 4);
}
