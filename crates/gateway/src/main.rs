//! DocQA API Gateway
//!
//! The HTTP entry point for questions.
//! Handles:
//! - Question answering (`POST /ask`)
//! - Liveness and readiness (`GET /health`, `GET /status`)
//! - Per-client rate limiting and the in-flight admission gate
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use docqa_common::{config::AppConfig, metrics, telemetry, ENGINE_NAME, VERSION};
use docqa_context::{build_engine, Bootstrap, QaEngine};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use middleware::rate_limit::{create_rate_limiter, ClientRateLimiter};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::signal;
use tokio::sync::Semaphore;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Set once the engine bootstrap finishes (successfully or not)
    pub boot: Arc<OnceLock<Bootstrap>>,
    pub limiter: Option<Arc<ClientRateLimiter>>,
    pub admission: Arc<Semaphore>,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: AppConfig, prometheus: Option<PrometheusHandle>) -> Self {
        let admission = Arc::new(Semaphore::new(config.server.max_concurrent_requests.max(1)));
        Self {
            limiter: create_rate_limiter(&config.rate_limit),
            config: Arc::new(config),
            boot: Arc::new(OnceLock::new()),
            admission,
            prometheus,
        }
    }

    pub fn engine(&self) -> Option<&Arc<QaEngine>> {
        self.boot.get().and_then(|boot| boot.engine.as_ref())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    telemetry::init_tracing(&config.observability);

    info!("Starting {} API Gateway v{}", ENGINE_NAME, VERSION);

    // Initialize metrics
    let prometheus = if config.observability.metrics_enabled {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(format!("{}_ask_duration_seconds", metrics::METRICS_PREFIX)),
                metrics::ASK_LATENCY_BUCKETS,
            )?
            .install_recorder()?;
        metrics::register_metrics();
        Some(handle)
    } else {
        None
    };

    let state = AppState::new(config, prometheus);

    // Build the engine in the background; /status reports "starting" meanwhile
    {
        let config = state.config.clone();
        let boot = state.boot.clone();
        tokio::spawn(async move {
            let bootstrap = build_engine(&config).await;
            if boot.set(bootstrap).is_err() {
                warn!("Engine bootstrap ran twice");
            }
        });
    }

    if let Some(limiter) = state.limiter.clone() {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                limiter.retain_recent();
            }
        });
    }

    let addr: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port)
        .parse()
        .context("Invalid server.host / server.port")?;

    // Build the router
    let app = create_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Rate limit runs before the request waits for an admission slot
    let ask_routes = Router::new()
        .route("/ask", post(handlers::ask::ask))
        .route_layer(from_fn_with_state(state.clone(), middleware::admission::admission))
        .route_layer(from_fn_with_state(state.clone(), middleware::rate_limit::rate_limit));

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/status", get(handlers::health::status))
        .route("/metrics", get(handlers::health::metrics))
        .merge(ask_routes)
        .layer(from_fn(middleware::track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
