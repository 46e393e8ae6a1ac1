//! Health, status and metrics handlers

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;
use docqa_common::errors::{AppError, Result};
use docqa_common::{ENGINE_NAME, VERSION};
use docqa_context::Readiness;

#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub qa_ready: bool,
    pub error: Option<String>,
    pub time: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    /// ready, error or starting
    pub status: &'static str,
    pub engine: &'static str,
    pub version: &'static str,
    pub qa_ready: bool,
    pub api_key_present: bool,
    pub index_exists: bool,
    pub index_chunks: Option<usize>,
    pub docs_file_exists: bool,
    pub initialization_error: Option<String>,
}

/// Liveness probe - healthy whenever the server answers
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        qa_ready: state.engine().is_some(),
        error: state
            .boot
            .get()
            .and_then(|boot| boot.readiness.initialization_error.clone()),
        time: Utc::now(),
    })
}

/// Readiness of the index, the documents file and the chat credential
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let (status, readiness) = match state.boot.get() {
        None => ("starting", Readiness::probe(&state.config)),
        Some(boot) if boot.engine.is_some() => ("ready", boot.readiness.clone()),
        Some(boot) => ("error", boot.readiness.clone()),
    };

    Json(StatusResponse {
        status,
        engine: ENGINE_NAME,
        version: VERSION,
        qa_ready: status == "ready",
        api_key_present: readiness.api_key_present,
        index_exists: readiness.index_exists,
        index_chunks: readiness.index_chunks,
        docs_file_exists: readiness.docs_file_exists,
        initialization_error: readiness.initialization_error,
    })
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<AppState>) -> Result<String> {
    state
        .prometheus
        .as_ref()
        .map(|handle| handle.render())
        .ok_or_else(|| AppError::ServiceUnavailable {
            message: "Metrics are disabled".to_string(),
        })
}
