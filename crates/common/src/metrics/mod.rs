//! Metrics and observability utilities
//!
//! Metric names share the `docqa` prefix. Recording goes through the
//! `metrics` facade; the gateway installs the Prometheus recorder.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all DocQA metrics
pub const METRICS_PREFIX: &str = "docqa";

/// Histogram buckets for end-to-end question latency (in seconds)
///
/// Dominated by the chat model call, capped by the 20s generation deadline.
pub const ASK_LATENCY_BUCKETS: &[f64] = &[
    0.050,  // 50ms (cache hits)
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    15.00,  // 15s
    20.00,  // 20s - generation deadline
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    describe_histogram!(
        format!("{}_ask_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Question answering latency in seconds"
    );

    describe_gauge!(
        format!("{}_retrieved_chunks", METRICS_PREFIX),
        Unit::Count,
        "Chunks handed to the composer for the last question"
    );

    describe_counter!(
        format!("{}_retrieval_fallbacks_total", METRICS_PREFIX),
        Unit::Count,
        "Hybrid retrievals that degraded to the single-query fallback"
    );

    describe_counter!(
        format!("{}_generation_outcomes_total", METRICS_PREFIX),
        Unit::Count,
        "Answers by outcome status"
    );

    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total answer cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total answer cache misses"
    );

    describe_counter!(
        format!("{}_chunks_indexed_total", METRICS_PREFIX),
        Unit::Count,
        "Total chunks added to the vector index"
    );

    describe_counter!(
        format!("{}_documents_discovered_total", METRICS_PREFIX),
        Unit::Count,
        "Pages ingested by on-demand discovery"
    );

    describe_counter!(
        format!("{}_rate_limited_total", METRICS_PREFIX),
        Unit::Count,
        "Requests rejected by the per-client rate limit"
    );

    describe_counter!(
        format!("{}_admission_rejected_total", METRICS_PREFIX),
        Unit::Count,
        "Requests rejected because the admission gate stayed full"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record one answered question
pub fn record_ask(duration_secs: f64, status: &str, chunks: usize) {
    histogram!(format!("{}_ask_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    counter!(
        format!("{}_generation_outcomes_total", METRICS_PREFIX),
        "status" => status.to_string()
    )
    .increment(1);

    gauge!(format!("{}_retrieved_chunks", METRICS_PREFIX)).set(chunks as f64);
}

/// Record a degraded retrieval; `recovered` is false when the fallback also failed
pub fn record_retrieval_fallback(recovered: bool) {
    counter!(
        format!("{}_retrieval_fallbacks_total", METRICS_PREFIX),
        "recovered" => recovered.to_string()
    )
    .increment(1);
}

pub fn record_cache_hit() {
    counter!(format!("{}_cache_hits_total", METRICS_PREFIX)).increment(1);
}

pub fn record_cache_miss() {
    counter!(format!("{}_cache_misses_total", METRICS_PREFIX)).increment(1);
}

/// Record chunks added to the index by `source` (rebuild, add-pdf, discovery, ...)
pub fn record_chunks_indexed(count: usize, source: &str) {
    counter!(
        format!("{}_chunks_indexed_total", METRICS_PREFIX),
        "source" => source.to_string()
    )
    .increment(count as u64);
}

pub fn record_discovered_document() {
    counter!(format!("{}_documents_discovered_total", METRICS_PREFIX)).increment(1);
}

pub fn record_rate_limited() {
    counter!(format!("{}_rate_limited_total", METRICS_PREFIX)).increment(1);
}

pub fn record_admission_rejected() {
    counter!(format!("{}_admission_rejected_total", METRICS_PREFIX)).increment(1);
}
