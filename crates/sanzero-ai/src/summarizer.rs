//! Generative summarization seam.
//!
//! A summary is an enhancement: callers always have a templated fallback, so
//! implementations report failure instead of retrying.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("summarizer disabled")]
    Disabled,
    #[error("summarizer request failed: {0}")]
    Transport(String),
    #[error("summarizer returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("summarizer returned no text")]
    EmptyResponse,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRequest {
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Model or backend name recorded with generated summaries.
    fn name(&self) -> &str;

    async fn summarize(&self, request: &SummaryRequest) -> Result<String, SummarizeError>;
}

/// Always fails, so every summary is templated.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn summarize(&self, _request: &SummaryRequest) -> Result<String, SummarizeError> {
        Err(SummarizeError::Disabled)
    }
}
