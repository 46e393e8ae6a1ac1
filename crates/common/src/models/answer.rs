//! Answer returned to callers

use serde::{Deserialize, Serialize};

/// How an answer was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// The chat model produced an answer from retrieved context
    Answered,
    /// Retrieval returned nothing
    NoResults,
    /// The chat model missed its deadline
    TimedOut,
    /// The chat model call failed
    GenerationFailed,
    /// Something unexpected broke inside the pipeline
    InternalError,
}

impl AnswerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerStatus::Answered => "answered",
            AnswerStatus::NoResults => "no_results",
            AnswerStatus::TimedOut => "timed_out",
            AnswerStatus::GenerationFailed => "generation_failed",
            AnswerStatus::InternalError => "internal_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub source_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub short_answer: String,
    pub long_answer: String,
    pub sources: Vec<SourceRef>,
    pub watch_video: bool,
    pub video_links: Vec<String>,
    pub status: AnswerStatus,
}

impl Answer {
    /// Answer carrying only a message pair and no sources
    pub fn sentinel(status: AnswerStatus, short: &str, long: &str) -> Self {
        Self {
            short_answer: short.to_string(),
            long_answer: long.to_string(),
            sources: Vec::new(),
            watch_video: false,
            video_links: Vec::new(),
            status,
        }
    }

    pub fn no_results() -> Self {
        Self::sentinel(
            AnswerStatus::NoResults,
            "No relevant documentation found.",
            "The system could not retrieve relevant information.",
        )
    }

    pub fn timed_out() -> Self {
        Self::sentinel(
            AnswerStatus::TimedOut,
            "Sorry, generating the answer took too long.",
            "The answer could not be generated in time. Please try again in a moment.",
        )
    }

    pub fn generation_failed() -> Self {
        Self::sentinel(
            AnswerStatus::GenerationFailed,
            "Sorry, the answer could not be generated.",
            "The language model service returned an error. Please try again later.",
        )
    }

    pub fn internal_error() -> Self {
        Self::sentinel(
            AnswerStatus::InternalError,
            "An internal error occurred.",
            "Something went wrong while processing your question.",
        )
    }

    pub fn is_answered(&self) -> bool {
        self.status == AnswerStatus::Answered
    }
}
