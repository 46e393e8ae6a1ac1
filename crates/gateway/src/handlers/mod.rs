//! API handlers module

pub mod ask;
pub mod health;

#[cfg(test)]
pub(crate) mod testing {
    use crate::{create_router, AppState};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use docqa_common::config::{AppConfig, ComposerConfig};
    use docqa_common::models::{Chunk, ScoredChunk};
    use docqa_common::{ChatModel, Result};
    use docqa_context::{AnswerComposer, Bootstrap, QaEngine, Readiness};
    use docqa_search::{QueryRouter, Retriever};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct OneChunk;

    #[async_trait]
    impl Retriever for OneChunk {
        async fn retrieve(&self, _query: &str, _k: usize) -> Vec<ScoredChunk> {
            vec![ScoredChunk {
                chunk: Chunk {
                    text: "Press Alt+F5 to reconcile.".into(),
                    source_url: "https://help.tallysolutions.com/bank-reconciliation/".into(),
                    title: "Bank Reconciliation Procedures".into(),
                    category: "Banking".into(),
                    index: 0,
                    start_offset: 0,
                    end_offset: 26,
                },
                score: 0.7,
                rank: 1,
            }]
        }
    }

    struct CannedModel;

    #[async_trait]
    impl ChatModel for CannedModel {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok("SHORT_ANSWER: Use Alt+F5. LONG_ANSWER: Open the bank ledger and press Alt+F5.".into())
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    pub fn ready_state(config: AppConfig) -> AppState {
        let engine = QaEngine::new(
            QueryRouter::default(),
            Arc::new(OneChunk),
            AnswerComposer::new(Arc::new(CannedModel), &ComposerConfig::default()),
        );
        let state = AppState::new(config, None);
        let _ = state.boot.set(Bootstrap {
            engine: Some(Arc::new(engine)),
            readiness: Readiness::default(),
        });
        state
    }

    pub async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    pub fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub fn ask(question: &str, client: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/ask")
            .header("content-type", "application/json")
            .header("x-client-id", client)
            .body(Body::from(serde_json::json!({ "question": question }).to_string()))
            .unwrap()
    }
}
