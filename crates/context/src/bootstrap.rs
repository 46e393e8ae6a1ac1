//! Engine bootstrap and readiness
//!
//! Configuration problems (missing index, missing credential) leave the
//! engine unbuilt and are reported through `Readiness` instead of aborting.

use crate::engine::QaEngine;
use docqa_common::config::AppConfig;
use docqa_common::embeddings::create_embedder;
use docqa_common::errors::AppError;
use docqa_common::llm::create_chat_model;
use docqa_common::{LocalVectorIndex, VectorIndex};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Default, Serialize)]
pub struct Readiness {
    pub docs_file_exists: bool,
    pub index_exists: bool,
    pub index_chunks: Option<usize>,
    pub api_key_present: bool,
    pub initialization_error: Option<String>,
}

impl Readiness {
    /// File-system and credential checks that need no engine
    pub fn probe(config: &AppConfig) -> Self {
        Self {
            docs_file_exists: config.store.docs_file.is_file(),
            index_exists: LocalVectorIndex::exists(&config.index.directory),
            index_chunks: None,
            api_key_present: config.has_llm_credential(),
            initialization_error: None,
        }
    }
}

pub struct Bootstrap {
    pub engine: Option<Arc<QaEngine>>,
    pub readiness: Readiness,
}

impl Bootstrap {
    pub fn is_ready(&self) -> bool {
        self.engine.is_some()
    }
}

/// Open the index, create the chat model and wire the engine
pub async fn build_engine(config: &AppConfig) -> Bootstrap {
    let mut readiness = Readiness::probe(config);

    let built = async {
        let embedder = create_embedder(&config.embedding)?;
        let index = Arc::new(LocalVectorIndex::open(&config.index.directory, embedder)?);
        let chunks = index.count().await?;
        let model = create_chat_model(&config.llm)?;
        let engine = QaEngine::from_config(config, index, model)?;
        Ok::<_, AppError>((engine, chunks))
    }
    .await;

    match built {
        Ok((engine, chunks)) => {
            readiness.index_chunks = Some(chunks);
            info!(chunks = chunks, model = engine.model_name(), "QA engine ready");
            Bootstrap {
                engine: Some(Arc::new(engine)),
                readiness,
            }
        }
        Err(e) => {
            error!(error = %e, "QA engine not initialised");
            readiness.initialization_error = Some(e.to_string());
            Bootstrap {
                engine: None,
                readiness,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_index_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.index.directory = dir.path().join("tally_index");
        config.store.docs_file = dir.path().join("tally_docs.json");
        config.llm.api_key = Some("test-key".into());

        let bootstrap = build_engine(&config).await;
        assert!(!bootstrap.is_ready());
        let readiness = bootstrap.readiness;
        assert!(!readiness.index_exists);
        assert!(!readiness.docs_file_exists);
        assert!(readiness.api_key_present);
        assert!(readiness
            .initialization_error
            .unwrap()
            .contains("Vector index not found"));
    }

    #[tokio::test]
    async fn test_missing_credential_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.index.directory = dir.path().join("tally_index");
        config.llm.api_key = None;
        config.llm.provider = "openai".into();

        let embedder = create_embedder(&config.embedding).unwrap();
        LocalVectorIndex::create(&config.index.directory, embedder).unwrap();

        let bootstrap = build_engine(&config).await;
        assert!(!bootstrap.is_ready());
        assert!(bootstrap.readiness.index_exists);
        assert!(!bootstrap.readiness.api_key_present);
        assert!(bootstrap
            .readiness
            .initialization_error
            .unwrap()
            .contains("OPENAI_API_KEY"));
    }
}
