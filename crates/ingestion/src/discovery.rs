//! On-demand discovery
//!
//! Before answering, look up the question's keywords in a master list of
//! help-site URLs, fetch the best-matching pages that are not yet known, and
//! add them to the store and index. Candidates are ranked by how many search
//! terms appear in the URL slug; acronyms and boost terms count triple.

use crate::errors::IngestionError;
use crate::processor::{AddOutcome, IngestionProcessor};
use async_trait::async_trait;
use docqa_common::config::DiscoveryConfig;
use docqa_common::metrics;
use docqa_common::models::Document;
use docqa_common::DocumentStore;
use regex_lite::Regex;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Category given to pages added by discovery
pub const DISCOVERED_CATEGORY: &str = "Discovered";

/// A fetched and cleaned web page
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub url: String,
    pub title: String,
    pub content: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, IngestionError>;
}

/// Search terms extracted from a question
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchTerms {
    /// Lower-cased terms, stop words removed
    pub terms: BTreeSet<String>,
    /// Lower-cased forms of the tokens written in upper case
    pub acronyms: HashSet<String>,
}

impl SearchTerms {
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// A URL from the master list with its slug score
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub url: String,
    pub score: u32,
}

/// What a discovery pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    pub candidates: usize,
    pub ingested: Vec<String>,
    pub chunks: usize,
}

/// Alphanumeric tokens of two or more characters, minus stop words
pub fn extract_terms(question: &str, stop_words: &[String]) -> SearchTerms {
    let stop: HashSet<String> = stop_words.iter().map(|w| w.to_lowercase()).collect();
    let mut terms = BTreeSet::new();
    let mut acronyms = HashSet::new();

    for token in question
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.len() >= 2)
    {
        let lowered = token.to_ascii_lowercase();
        if stop.contains(&lowered) {
            continue;
        }
        let has_letter = token.chars().any(|c| c.is_ascii_alphabetic());
        if has_letter && !token.chars().any(|c| c.is_ascii_lowercase()) {
            acronyms.insert(lowered.clone());
        }
        terms.insert(lowered);
    }

    SearchTerms { terms, acronyms }
}

/// Slug of a help URL: last path segment with dashes as spaces
pub fn slug(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .replace('-', " ")
        .to_lowercase()
}

/// +3 per acronym or boost term contained in the slug, +1 per other term
pub fn score_slug(slug: &str, terms: &SearchTerms, boost_terms: &[String]) -> u32 {
    terms
        .terms
        .iter()
        .filter(|term| slug.contains(term.as_str()))
        .map(|term| {
            if terms.acronyms.contains(term) || boost_terms.iter().any(|b| b == term) {
                3
            } else {
                1
            }
        })
        .sum()
}

/// Score every URL in the master list; best first, list order among ties
pub fn rank_candidates(
    url_list: &str,
    pattern: &Regex,
    terms: &SearchTerms,
    boost_terms: &[String],
    min_score: u32,
) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut candidates: Vec<Candidate> = url_list
        .lines()
        .filter_map(|line| pattern.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .filter(|url| seen.insert(url.clone()))
        .map(|url| {
            let score = score_slug(&slug(&url), terms, boost_terms);
            Candidate { url, score }
        })
        .filter(|c| c.score >= min_score)
        .collect();

    candidates.sort_by(|a, b| b.score.cmp(&a.score));
    candidates
}

pub struct Discovery {
    config: DiscoveryConfig,
    pattern: Regex,
    fetcher: Arc<dyn PageFetcher>,
    processor: Arc<IngestionProcessor>,
    store: Arc<Mutex<DocumentStore>>,
}

impl Discovery {
    pub fn new(
        config: DiscoveryConfig,
        fetcher: Arc<dyn PageFetcher>,
        processor: Arc<IngestionProcessor>,
        store: Arc<Mutex<DocumentStore>>,
    ) -> Result<Self, IngestionError> {
        let pattern = Regex::new(&config.url_pattern).map_err(|e| {
            IngestionError::ConfigError(format!("Invalid discovery url_pattern: {}", e))
        })?;
        if pattern.captures_len() < 2 {
            return Err(IngestionError::ConfigError(
                "Discovery url_pattern needs a capture group for the URL".to_string(),
            ));
        }

        Ok(Self {
            config,
            pattern,
            fetcher,
            processor,
            store,
        })
    }

    /// Find, fetch and index pages relevant to `question`
    pub async fn discover(&self, question: &str) -> Result<DiscoveryReport, IngestionError> {
        let terms = extract_terms(question, &self.config.stop_words);
        if terms.is_empty() {
            debug!("No significant search terms for discovery");
            return Ok(DiscoveryReport::default());
        }

        let url_list = match tokio::fs::read_to_string(&self.config.url_list).await {
            Ok(list) => list,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.config.url_list.display(), "URL master list not found");
                return Ok(DiscoveryReport::default());
            }
            Err(e) => return Err(e.into()),
        };

        let candidates = rank_candidates(
            &url_list,
            &self.pattern,
            &terms,
            &self.config.boost_terms,
            self.config.min_score,
        );
        debug!(terms = ?terms.terms, candidates = candidates.len(), "Discovery candidates ranked");

        let mut report = DiscoveryReport {
            candidates: candidates.len(),
            ..DiscoveryReport::default()
        };

        let mut attempts = 0;
        for candidate in candidates {
            if attempts >= self.config.max_ingest_per_query {
                break;
            }
            {
                let store = self.store.lock().await;
                if self.processor.is_known(&store, &candidate.url).await? {
                    continue;
                }
            }
            attempts += 1;

            match self.ingest(&candidate.url).await {
                Ok(Some(chunks)) => {
                    info!(url = %candidate.url, score = candidate.score, chunks = chunks, "Discovered new page");
                    metrics::record_discovered_document();
                    report.ingested.push(candidate.url);
                    report.chunks += chunks;
                }
                Ok(None) => debug!(url = %candidate.url, "Discovered page too short, skipped"),
                Err(e) => warn!(url = %candidate.url, error = %e, "Discovery ingest failed"),
            }
        }

        if report.chunks > 0 {
            self.processor.index().flush().await?;
        }
        Ok(report)
    }

    async fn ingest(&self, url: &str) -> Result<Option<usize>, IngestionError> {
        let page = self.fetcher.fetch(url).await?;
        if page.content.chars().count() < self.config.min_content_chars {
            return Ok(None);
        }

        let doc = Document::new(page.url, page.title, page.content, DISCOVERED_CATEGORY);
        let mut store = self.store.lock().await;
        match self.processor.add_document(&mut store, doc, "discovery").await? {
            AddOutcome::Added { chunks } => Ok(Some(chunks)),
            _ => Ok(None),
        }
    }
}

/// Fetches pages over HTTP and reduces the HTML to text
pub struct HttpPageFetcher {
    client: reqwest::Client,
    cleaner: HtmlCleaner,
}

impl HttpPageFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, IngestionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("docqa/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IngestionError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            cleaner: HtmlCleaner::new()?,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, IngestionError> {
        let fetch_error = |message: String| IngestionError::FetchError {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fetch_error(format!("HTTP {}", response.status())));
        }
        let html = response.text().await.map_err(|e| fetch_error(e.to_string()))?;

        Ok(FetchedPage {
            url: url.to_string(),
            title: self.cleaner.title(&html).unwrap_or_else(|| slug(url)),
            content: self.cleaner.text(&html),
        })
    }
}

/// Minimal HTML-to-text reduction
struct HtmlCleaner {
    title: Regex,
    noise: Regex,
    breaks: Regex,
    tags: Regex,
}

impl HtmlCleaner {
    fn new() -> Result<Self, IngestionError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| IngestionError::ConfigError(e.to_string()))
        };
        Ok(Self {
            title: compile(r"(?is)<title[^>]*>(.*?)</title>")?,
            noise: compile(
                r"(?is)<script\b.*?</script>|<style\b.*?</style>|<nav\b.*?</nav>|<header\b.*?</header>|<footer\b.*?</footer>|<!--.*?-->",
            )?,
            breaks: compile(r"(?i)<br\s*/?>|</(title|p|div|li|h[1-6]|tr|section|article)>")?,
            tags: compile(r"(?s)<[^>]+>")?,
        })
    }

    fn title(&self, html: &str) -> Option<String> {
        self.title
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| collapse_spaces(&decode_entities(m.as_str())))
            .filter(|t| !t.is_empty())
    }

    fn text(&self, html: &str) -> String {
        let without_noise = self.noise.replace_all(html, " ");
        let with_breaks = self.breaks.replace_all(&without_noise, "\n");
        let stripped = self.tags.replace_all(&with_breaks, " ");
        decode_entities(&stripped)
            .lines()
            .map(collapse_spaces)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
