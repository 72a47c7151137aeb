//! Summarizer client, the language-model collaborator
//!
//! Defines the client trait and error type for summarizing one article.
//! Two implementations:
//! - `ClaudeSummarizer`: Anthropic Messages API over HTTP (production)
//! - `MockSummarizer`: scripted responses (testing)

mod claude;
mod mock;

pub use claude::{parse_summary_response, ClaudeSummarizer, DEFAULT_MODEL};
pub use mock::{MockSummarizer, MockSummaryResponse};

use crate::article::{Article, Summary};
use crate::retry::Retryable;
use async_trait::async_trait;
use std::time::Duration;

/// Errors from summarizer operations.
///
/// `RateLimited` is the only variant the worker retries.
#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    #[error("rate limited by model provider")]
    RateLimited { retry_after: Option<Duration> },
    #[error("request failed: {0}")]
    Request(String),
    #[error("model API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("response parse error: {0}")]
    Parse(String),
    #[error("model returned an empty summary")]
    EmptySummary,
}

impl Retryable for SummarizeError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Client trait for summarizing articles.
///
/// Abstracts over transport (HTTP, mock) so the worker doesn't depend on
/// how the model is reached. Implementations make a single attempt; retry
/// policy belongs to the caller.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Produce a summary and hashtags for one article.
    async fn summarize(&self, article: &Article) -> Result<Summary, SummarizeError>;
}
