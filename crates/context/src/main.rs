//! DocQA interactive CLI
//!
//! Answers questions from the terminal until `quit`, `exit`, `q` or `bye`.

use anyhow::Context;
use clap::Parser;
use docqa_common::{config::AppConfig, models::Answer, telemetry, VERSION};
use docqa_context::build_engine;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

const EXIT_WORDS: [&str; 4] = ["quit", "exit", "q", "bye"];

#[derive(Parser)]
#[command(name = "ask", version, about = "Ask questions about the documentation")]
struct Cli {
    /// Answer a single question and exit
    question: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load().context("Failed to load configuration")?;
    config.observability.json_logging = false;
    telemetry::init_tracing(&config.observability);

    let bootstrap = build_engine(&config).await;
    let engine = match bootstrap.engine {
        Some(engine) => engine,
        None => anyhow::bail!(
            "QA engine not ready: {}",
            bootstrap
                .readiness
                .initialization_error
                .unwrap_or_else(|| "unknown error".to_string())
        ),
    };

    if let Some(question) = cli.question {
        print_answer(&engine.ask(&question).await);
        return Ok(());
    }

    println!("{} v{} ({})", docqa_common::ENGINE_NAME, VERSION, engine.model_name());
    println!("Type a question, or 'quit' to leave.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("Question: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&question.to_lowercase().as_str()) {
            break;
        }

        print_answer(&engine.ask(question).await);
    }

    println!("Goodbye.");
    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("\n{}\n", answer.short_answer);
    println!("{}\n", answer.long_answer);
    if !answer.sources.is_empty() {
        println!("Sources:");
        for source in answer.sources.iter().take(3) {
            println!("  - {} ({})", source.title, source.source_url);
        }
    }
    if answer.watch_video {
        println!("Videos:");
        for link in &answer.video_links {
            println!("  - {}", link);
        }
    }
    println!();
}
