//! Ingestion error types

use docqa_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("PDF parse error for {path}: {message}")]
    PdfParseError { path: String, message: String },

    #[error("Chunking error: {0}")]
    ChunkingError(String),

    #[error("Document store error: {0}")]
    StoreError(String),

    #[error("Vector index error: {0}")]
    IndexError(String),

    #[error("Fetch error for {url}: {message}")]
    FetchError { url: String, message: String },

    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<AppError> for IngestionError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::Store { message } => IngestionError::StoreError(message),
            AppError::Configuration { .. }
            | AppError::IndexMissing { .. }
            | AppError::MissingCredential { .. } => IngestionError::ConfigError(e.to_string()),
            other => IngestionError::IndexError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_mapping() {
        let err: IngestionError = AppError::IndexMissing {
            path: "./tally_index".into(),
        }
        .into();
        assert!(matches!(err, IngestionError::ConfigError(_)));

        let err: IngestionError = AppError::Embedding {
            message: "503".into(),
        }
        .into();
        assert!(matches!(err, IngestionError::IndexError(_)));
    }
}
