//! DocQA Ingestion CLI
//!
//! Maintains the document store and the vector index:
//! - `rebuild`: full, checkpointed index build from the store
//! - `add-pdf` / `add-pdfs`: incremental PDF ingestion
//! - `add-docs`: append scraped documents from a JSON file
//! - `add-urls`: fetch help pages by URL and add them
//! - `discover`: run on-demand discovery for a question
//! - `status`: report store, index and checkpoint state

use anyhow::Context;
use clap::{Parser, Subcommand};
use docqa_common::{
    config::AppConfig, embeddings::create_embedder, telemetry, DocumentStore, Embedder,
    LocalVectorIndex, VectorIndex, VERSION,
};
use docqa_ingestion::{
    BuildOutcome, Chunker, Discovery, HttpPageFetcher, IndexBuildJob, IngestionProcessor,
};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "ingestion", version, about = "Build and extend the DocQA index")]
struct Cli {
    /// Configuration file to use instead of the `config/` layers
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the vector index from the document store
    Rebuild {
        /// Ignore any checkpoint from an interrupted build
        #[arg(long)]
        fresh: bool,
    },
    /// Add a single PDF
    AddPdf { path: PathBuf },
    /// Add every PDF in a directory
    AddPdfs {
        #[arg(default_value = "pdf_docs")]
        dir: PathBuf,
    },
    /// Add scraped documents from a JSON array file
    AddDocs { path: PathBuf },
    /// Fetch help pages and add them
    AddUrls {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Discover and ingest help pages relevant to a question
    Discover { question: String },
    /// Show store and index state
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match cli.config.as_deref() {
        Some(path) => AppConfig::from_file(path).with_context(|| format!("Failed to load {}", path))?,
        None => AppConfig::load().context("Failed to load configuration")?,
    };
    config.observability.json_logging = false;
    telemetry::init_tracing(&config.observability);

    info!("DocQA ingestion v{}", VERSION);

    let mut store = DocumentStore::open(&config.store.docs_file)
        .with_context(|| format!("Failed to open {}", config.store.docs_file.display()))?;
    let embedder = create_embedder(&config.embedding)?;

    match cli.command {
        Command::Rebuild { fresh } => {
            let job = IndexBuildJob::new(&config, embedder)?;
            let cancel = job.cancel_flag();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, stopping after the current batch");
                    cancel.store(true, Ordering::SeqCst);
                }
            });

            match job.run(&store, fresh).await? {
                BuildOutcome::Completed { documents, chunks } => {
                    println!("Indexed {} documents into {} chunks", documents, chunks);
                }
                BuildOutcome::Cancelled { next_document, chunks } => {
                    println!(
                        "Cancelled after {} documents ({} chunks); run `ingestion rebuild` to resume",
                        next_document, chunks
                    );
                }
            }
        }
        Command::AddPdf { path } => {
            let processor = processor(&config, embedder)?;
            let outcome = processor.add_pdf(&mut store, &path).await?;
            println!("{}: {:?}", path.display(), outcome);
        }
        Command::AddPdfs { dir } => {
            let processor = processor(&config, embedder)?;
            let summary = processor.add_pdfs(&mut store, &dir).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::AddDocs { path } => {
            let processor = processor(&config, embedder)?;
            let summary = processor.add_documents_file(&mut store, &path).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::AddUrls { urls } => {
            let processor = processor(&config, embedder)?;
            let fetcher = HttpPageFetcher::new(config.discovery.fetch_timeout_secs)?;
            let summary = processor
                .add_urls(&mut store, &fetcher, &urls, config.discovery.min_content_chars)
                .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Discover { question } => {
            let processor = Arc::new(processor(&config, embedder)?);
            let fetcher = Arc::new(HttpPageFetcher::new(config.discovery.fetch_timeout_secs)?);
            let discovery = Discovery::new(
                config.discovery.clone(),
                fetcher,
                processor,
                Arc::new(Mutex::new(store)),
            )?;
            let report = discovery.discover(&question).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Status => {
            println!("Store:      {} ({} documents)", store.path().display(), store.len());
            if LocalVectorIndex::exists(&config.index.directory) {
                let index = LocalVectorIndex::open(&config.index.directory, embedder.clone())?;
                println!(
                    "Index:      {} ({} chunks, {})",
                    index.directory().display(),
                    index.count().await?,
                    embedder.model_name()
                );
            } else {
                println!("Index:      missing at {}", config.index.directory.display());
            }
            let job = IndexBuildJob::new(&config, embedder)?;
            match job.pending_checkpoint()? {
                Some(cp) => println!(
                    "Checkpoint: {} of {} documents, {} chunks{}",
                    cp.next_document,
                    store.len(),
                    cp.chunks_indexed,
                    if cp.matches(&store.fingerprint()) {
                        ""
                    } else {
                        " (stale)"
                    }
                ),
                None => println!("Checkpoint: none"),
            }
        }
    }

    Ok(())
}

fn processor(
    config: &AppConfig,
    embedder: Arc<dyn Embedder>,
) -> anyhow::Result<IngestionProcessor> {
    let index = LocalVectorIndex::open_or_create(&config.index.directory, embedder)?;
    Ok(IngestionProcessor::new(Chunker::new(&config.chunking)?, Arc::new(index)))
}
