//! Admission gate bounding questions in flight

use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use docqa_common::errors::AppError;
use docqa_common::metrics;
use tracing::warn;

/// Wait up to `server.admission_wait_secs` for a slot, otherwise 503
pub async fn admission(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let wait = state.config.admission_wait();
    let permit = tokio::time::timeout(wait, state.admission.clone().acquire_owned()).await;

    match permit {
        Ok(Ok(permit)) => {
            let response = next.run(request).await;
            drop(permit);
            Ok(response)
        }
        _ => {
            let limit = state.config.server.max_concurrent_requests;
            warn!(limit = limit, wait_secs = wait.as_secs(), "Admission gate full");
            metrics::record_admission_rejected();
            Err(AppError::Overloaded { limit })
        }
    }
}
