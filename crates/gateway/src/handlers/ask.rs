//! Question handler

use axum::{extract::State, Json};
use serde::Deserialize;
use validator::Validate;

use crate::AppState;
use docqa_common::{
    errors::{AppError, Result},
    models::Answer,
};

/// Ask request
#[derive(Debug, Deserialize, Validate)]
pub struct AskRequest {
    #[validate(length(max = 2000))]
    pub question: String,
}

/// Answer a question
///
/// Model failures and empty retrievals are typed answers with status 200;
/// only malformed requests and an unready engine are errors.
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<Answer>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("question".to_string()),
    })?;

    let question = request.question.trim();
    if question.is_empty() {
        return Err(AppError::Validation {
            message: "Question must not be empty".to_string(),
            field: Some("question".to_string()),
        });
    }

    let engine = match state.boot.get() {
        None => {
            return Err(AppError::ServiceUnavailable {
                message: "QA engine is still starting".to_string(),
            })
        }
        Some(boot) => boot.engine.as_ref().ok_or_else(|| AppError::ServiceUnavailable {
            message: boot
                .readiness
                .initialization_error
                .clone()
                .unwrap_or_else(|| "QA engine not initialised".to_string()),
        })?,
    };

    tracing::info!(question_chars = question.chars().count(), "Question received");
    Ok(Json(engine.ask(question).await))
}
