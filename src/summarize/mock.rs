//! Mock summarizer for testing: returns scripted responses.

use super::{SummarizeError, Summarizer};
use crate::article::{Article, Summary};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One scripted reply for an article.
#[derive(Debug, Clone)]
pub enum MockSummaryResponse {
    Ok(Summary),
    RateLimited(Option<Duration>),
    Fail(String),
}

/// Summarizer returning scripted replies per article url.
///
/// Scripts are consumed front to back; once an article's script is empty
/// the mock answers with a deterministic default summary
/// (`"Summary of {title}."`, tagged `#AI`).
pub struct MockSummarizer {
    scripts: DashMap<String, VecDeque<MockSummaryResponse>>,
    latency: Duration,
    calls: AtomicUsize,
}

impl Default for MockSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSummarizer {
    pub fn new() -> Self {
        Self {
            scripts: DashMap::new(),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue a reply for the article at `url`.
    pub fn with_response(self, url: impl Into<String>, response: MockSummaryResponse) -> Self {
        self.scripts.entry(url.into()).or_default().push_back(response);
        self
    }

    /// Queue `times` rate-limit replies for the article at `url`.
    pub fn with_rate_limits(self, url: impl Into<String>, times: usize) -> Self {
        let url = url.into();
        for _ in 0..times {
            self.scripts
                .entry(url.clone())
                .or_default()
                .push_back(MockSummaryResponse::RateLimited(None));
        }
        self
    }

    /// Make every call take `latency` (tokio time, so paused-clock tests stay instant).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of `summarize` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn default_summary(article: &Article) -> Summary {
        Summary::new(format!("Summary of {}.", article.title), vec!["#AI".to_string()])
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, article: &Article) -> Result<Summary, SummarizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scripted = self
            .scripts
            .get_mut(&article.url)
            .and_then(|mut queue| queue.pop_front());

        match scripted {
            Some(MockSummaryResponse::Ok(summary)) => Ok(summary),
            Some(MockSummaryResponse::RateLimited(retry_after)) => {
                Err(SummarizeError::RateLimited { retry_after })
            }
            Some(MockSummaryResponse::Fail(msg)) => Err(SummarizeError::Request(msg)),
            None => Ok(Self::default_summary(article)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unscripted_articles_get_default_summary() {
        let mock = MockSummarizer::new();
        let summary = mock.summarize(&Article::new("Paper", "u1")).await.unwrap();
        assert_eq!(summary.text, "Summary of Paper.");
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn scripts_are_consumed_in_order() {
        let mock = MockSummarizer::new()
            .with_rate_limits("u1", 1)
            .with_response("u1", MockSummaryResponse::Fail("boom".into()));
        let article = Article::new("Paper", "u1");

        assert!(matches!(
            mock.summarize(&article).await,
            Err(SummarizeError::RateLimited { .. })
        ));
        assert!(matches!(
            mock.summarize(&article).await,
            Err(SummarizeError::Request(_))
        ));
        assert!(mock.summarize(&article).await.is_ok());
    }
}
