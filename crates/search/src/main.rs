//! DocQA Search CLI
//!
//! Debug tool that shows what the retriever would hand to the composer:
//! - The routed query text and retrieval depth
//! - Which routing rules fired
//! - The merged, prioritised chunk list

use anyhow::Context;
use clap::Parser;
use docqa_common::{
    config::AppConfig, embeddings::create_embedder, telemetry, LocalVectorIndex, VERSION,
};
use docqa_search::{HybridRetriever, QueryRouter, Retriever};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "search", version, about = "Inspect routing and retrieval for a question")]
struct Cli {
    /// Question to route and retrieve for
    query: String,

    /// Override the routed retrieval depth
    #[arg(short, long)]
    k: Option<usize>,

    /// Print full chunk text instead of a preview
    #[arg(long)]
    full: bool,

    /// Emit JSON instead of a readable listing
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load().context("Failed to load configuration")?;
    config.observability.json_logging = false;
    telemetry::init_tracing(&config.observability);

    info!("DocQA search v{}", VERSION);

    let embedder = create_embedder(&config.embedding)?;
    let index = LocalVectorIndex::open(&config.index.directory, embedder).with_context(|| {
        format!(
            "No vector index at {}; run `ingestion rebuild` first",
            config.index.directory.display()
        )
    })?;

    let router = QueryRouter::new(&config.routing);
    let retriever = HybridRetriever::new(Arc::new(index), &config.retrieval);

    let mut routed = router.classify(&cli.query);
    if let Some(k) = cli.k {
        routed.k = k;
    }
    let chunks = retriever.retrieve(&routed.query, routed.k).await;

    if cli.json {
        let body = serde_json::json!({ "routed": routed, "chunks": chunks });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("Query:   {}", routed.query);
    println!("k:       {}", routed.k);
    println!(
        "Rules:   {}",
        if routed.matched.is_empty() {
            "(none)".to_string()
        } else {
            routed.matched.join(", ")
        }
    );
    println!("Results: {}\n", chunks.len());

    for chunk in &chunks {
        println!(
            "[{}] {:.3} {:?} {}",
            chunk.rank,
            chunk.score,
            chunk.kind(),
            chunk.chunk.title
        );
        println!("    {}", chunk.chunk.source_url);
        let text = if cli.full {
            chunk.chunk.text.clone()
        } else {
            chunk.chunk.text.chars().take(200).collect::<String>()
        };
        println!("    {}\n", text.replace('\n', " "));
    }

    Ok(())
}
