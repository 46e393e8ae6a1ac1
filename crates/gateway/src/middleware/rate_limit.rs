//! Per-client rate limiting using a keyed token bucket
//!
//! Clients are identified by `X-Client-Id`, then the first `X-Forwarded-For`
//! address, then the peer address.

use crate::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use docqa_common::config::RateLimitConfig;
use docqa_common::errors::AppError;
use docqa_common::metrics;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter keyed by client identity
pub type ClientRateLimiter = DefaultKeyedRateLimiter<String>;

/// `None` when rate limiting is disabled or the rate is zero
pub fn create_rate_limiter(config: &RateLimitConfig) -> Option<Arc<ClientRateLimiter>> {
    if !config.enabled {
        return None;
    }
    let per_minute = NonZeroU32::new(config.requests_per_minute)?;
    let burst = NonZeroU32::new(config.burst).unwrap_or(per_minute);

    Some(Arc::new(RateLimiter::keyed(
        Quota::per_minute(per_minute).allow_burst(burst),
    )))
}

pub fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    header("x-client-id")
        .or_else(|| header("x-forwarded-for"))
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Rate limiting middleware
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(limiter) = state.limiter.as_ref() else {
        return Ok(next.run(request).await);
    };

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let client = client_id(request.headers(), peer);

    match limiter.check_key(&client) {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!(client = %client, "Rate limit exceeded");
            metrics::record_rate_limited();
            Err(AppError::RateLimited {
                limit: state.config.rate_limit.requests_per_minute,
            })
        }
    }
}
