//! Configuration management for DocQA services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml, config/local.toml)
//! - Default values
//!
//! Every field has a default, so an empty configuration is valid.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Document store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Vector index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Chunker configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chat model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Hybrid retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Query routing rules
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Answer composition configuration
    #[serde(default)]
    pub composer: ComposerConfig,

    /// Answer cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// On-demand discovery configuration
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum questions answered concurrently
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,

    /// How long a question may wait for an admission slot
    #[serde(default = "default_admission_wait")]
    pub admission_wait_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// JSON array of scraped documents
    #[serde(default = "default_docs_file")]
    pub docs_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Directory holding the persisted vector index
    #[serde(default = "default_index_dir")]
    pub directory: PathBuf,

    /// Documents processed between rebuild checkpoints
    #[serde(default = "default_batch_documents")]
    pub batch_documents: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Minimum characters shared by consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: hashing, openai
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (hashing provider)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Give up retrying after this many seconds
    #[serde(default = "default_embedding_retry_window")]
    pub max_retry_secs: u64,

    /// Texts per embedding request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Chat provider: anthropic, openai
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// API key (falls back to ANTHROPIC_API_KEY / OPENAI_API_KEY)
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: f32,
}

/// Which source class is filled first when merging retrieval pools
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePriority {
    /// Web help pages first (fresher content)
    #[default]
    Web,
    /// PDF manuals first
    Pdf,
}

/// How the primary (whole-index) query is issued
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Similarity,
    Mmr,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Primary query mode
    #[serde(default)]
    pub mode: SearchMode,

    /// PDF pool is fetched at k times this factor before filtering
    #[serde(default = "default_pdf_pool_factor")]
    pub pdf_pool_factor: usize,

    /// Characters of chunk text used as the dedup fingerprint
    #[serde(default = "default_dedup_prefix")]
    pub dedup_prefix_chars: usize,

    /// Source class filled first
    #[serde(default)]
    pub priority: SourcePriority,

    /// Cap for the prioritised class
    #[serde(default = "default_primary_cap")]
    pub primary_cap: usize,

    /// Cap for both classes together
    #[serde(default = "default_total_cap")]
    pub total_cap: usize,

    /// Final number of chunks handed to the composer
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,

    /// k used by the single-query fallback
    #[serde(default = "default_fallback_k")]
    pub fallback_k: usize,

    /// MMR candidate pool is k times this factor
    #[serde(default = "default_mmr_fetch_factor")]
    pub mmr_fetch_factor: usize,

    /// MMR relevance/diversity balance (1.0 = pure relevance)
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f32,
}

/// One declarative routing rule
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RouteRule {
    /// Rule name reported in routing decisions
    pub name: String,

    /// Lower-case substrings that trigger the rule
    pub triggers: Vec<String>,

    /// Terms appended to the query text
    #[serde(default)]
    pub query_suffix: String,

    /// Retrieval depth requested when the rule matches
    pub k: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutingConfig {
    /// Retrieval depth when no rule matches
    #[serde(default = "default_k")]
    pub default_k: usize,

    /// Rules evaluated in order
    #[serde(default = "default_route_rules")]
    pub rules: Vec<RouteRule>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ComposerConfig {
    /// Chat model deadline in seconds
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,

    /// Maximum entries in the source list
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Cached answers kept (0 disables the cache)
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Questions per minute per client
    #[serde(default = "default_rate_limit")]
    pub requests_per_minute: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Augment the index while answering
    #[serde(default)]
    pub enabled: bool,

    /// Master list of site URLs, one per line
    #[serde(default = "default_url_list")]
    pub url_list: PathBuf,

    /// Pattern whose first capture group is the page URL
    #[serde(default = "default_url_pattern")]
    pub url_pattern: String,

    /// Pages ingested per question at most
    #[serde(default = "default_max_ingest")]
    pub max_ingest_per_query: usize,

    /// Minimum slug score for a candidate
    #[serde(default = "default_min_score")]
    pub min_score: u32,

    /// Pages shorter than this are ignored
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,

    /// Page fetch timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Words ignored when extracting search terms
    #[serde(default = "default_stop_words")]
    pub stop_words: Vec<String>,

    /// Terms worth triple weight
    #[serde(default = "default_boost_terms")]
    pub boost_terms: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Expose Prometheus metrics
    #[serde(default = "default_enabled")]
    pub metrics_enabled: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_max_concurrent() -> usize { 5 }
fn default_admission_wait() -> u64 { 10 }
fn default_docs_file() -> PathBuf { PathBuf::from("tally_docs.json") }
fn default_index_dir() -> PathBuf { PathBuf::from("./tally_index") }
fn default_batch_documents() -> usize { 25 }
fn default_chunk_size() -> usize { 1000 }
fn default_chunk_overlap() -> usize { 200 }
fn default_embedding_provider() -> String { "hashing".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dimension() -> usize { 384 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retry_window() -> u64 { 20 }
fn default_batch_size() -> usize { 64 }
fn default_llm_provider() -> String { "anthropic".to_string() }
fn default_llm_model() -> String { "claude-sonnet-4-20250514".to_string() }
fn default_max_tokens() -> u32 { 1500 }
fn default_pdf_pool_factor() -> usize { 5 }
fn default_dedup_prefix() -> usize { 200 }
fn default_primary_cap() -> usize { 12 }
fn default_total_cap() -> usize { 20 }
fn default_context_limit() -> usize { 15 }
fn default_fallback_k() -> usize { 10 }
fn default_mmr_fetch_factor() -> usize { 3 }
fn default_mmr_lambda() -> f32 { 0.5 }
fn default_k() -> usize { 15 }
fn default_generation_timeout() -> u64 { 20 }
fn default_max_sources() -> usize { 5 }
fn default_cache_capacity() -> usize { 256 }
fn default_rate_limit() -> u32 { 10 }
fn default_burst() -> u32 { 10 }
fn default_enabled() -> bool { true }
fn default_url_list() -> PathBuf { PathBuf::from("tally-site-urls.txt") }
fn default_url_pattern() -> String { r"(https://help\.tallysolutions\.com/[\w-]+/)".to_string() }
fn default_max_ingest() -> usize { 3 }
fn default_min_score() -> u32 { 1 }
fn default_min_content_chars() -> usize { 100 }
fn default_fetch_timeout() -> u64 { 30 }
fn default_stop_words() -> Vec<String> {
    [
        "how", "to", "do", "in", "the", "is", "tally", "prime", "what", "where", "can",
        "pass", "entry", "meaning", "explain",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_boost_terms() -> Vec<String> {
    ["journal", "voucher", "manufacturing", "gst", "rcm"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "docqa".to_string() }

/// Built-in keyword groups for acronym-heavy accounting questions
pub fn default_route_rules() -> Vec<RouteRule> {
    fn rule(name: &str, triggers: &[&str], query_suffix: &str, k: usize) -> RouteRule {
        RouteRule {
            name: name.to_string(),
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
            query_suffix: query_suffix.to_string(),
            k,
        }
    }

    vec![
        rule(
            "tax",
            &["gst", "tax", "tds", "tcs", "vat", "rcm", "e-way bill", "e-invoice", "hsn"],
            "GST goods and services tax returns filing GSTR tax ledger",
            35,
        ),
        rule(
            "security",
            &["security", "permission", "user access", "password", "tallyvault", "access control"],
            "security control users and passwords user roles permissions",
            30,
        ),
        rule(
            "inventory",
            &["inventory", "stock", "reorder", "re-order", "godown"],
            "stock item inventory reorder level godown",
            30,
        ),
        rule("complete", &["complete", "full"], "", 30),
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_concurrent_requests: default_max_concurrent(),
            admission_wait_secs: default_admission_wait(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { docs_file: default_docs_file() }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            directory: default_index_dir(),
            batch_documents: default_batch_documents(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retry_secs: default_embedding_retry_window(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: None,
            api_base: None,
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: SearchMode::default(),
            pdf_pool_factor: default_pdf_pool_factor(),
            dedup_prefix_chars: default_dedup_prefix(),
            priority: SourcePriority::default(),
            primary_cap: default_primary_cap(),
            total_cap: default_total_cap(),
            context_limit: default_context_limit(),
            fallback_k: default_fallback_k(),
            mmr_fetch_factor: default_mmr_fetch_factor(),
            mmr_lambda: default_mmr_lambda(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            rules: default_route_rules(),
        }
    }
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            generation_timeout_secs: default_generation_timeout(),
            max_sources: default_max_sources(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: default_cache_capacity() }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url_list: default_url_list(),
            url_pattern: default_url_pattern(),
            max_ingest_per_query: default_max_ingest(),
            min_score: default_min_score(),
            min_content_chars: default_min_content_chars(),
            fetch_timeout_secs: default_fetch_timeout(),
            stop_words: default_stop_words(),
            boost_terms: default_boost_terms(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_enabled: default_enabled(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Self = config.try_deserialize()?;
        config.apply_credential_fallbacks();
        Ok(config)
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Self = config.try_deserialize()?;
        config.apply_credential_fallbacks();
        Ok(config)
    }

    /// Fill missing API keys from the conventional provider variables
    fn apply_credential_fallbacks(&mut self) {
        if self.llm.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            self.llm.api_key = provider_key_var(&self.llm.provider)
                .and_then(|var| std::env::var(var).ok())
                .filter(|k| !k.trim().is_empty());
        }
        if self.embedding.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            self.embedding.api_key = provider_key_var(&self.embedding.provider)
                .and_then(|var| std::env::var(var).ok())
                .filter(|k| !k.trim().is_empty());
        }
    }

    /// Whether the chat model credential is configured
    pub fn has_llm_credential(&self) -> bool {
        self.llm
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }

    /// Get the chat model deadline as Duration
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.composer.generation_timeout_secs)
    }

    /// Get the admission wait as Duration
    pub fn admission_wait(&self) -> Duration {
        Duration::from_secs(self.server.admission_wait_secs)
    }
}

/// Environment variable conventionally holding a provider's key
pub fn provider_key_var(provider: &str) -> Option<&'static str> {
    match provider {
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        _ => None,
    }
}
