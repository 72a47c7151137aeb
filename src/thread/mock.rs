//! Mock posting client for testing: records every published post.

use super::{MessageId, PostError, PostingClient};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A post accepted by `MockPostingClient`
#[derive(Debug, Clone, PartialEq)]
pub struct PostedMessage {
    pub id: MessageId,
    pub text: String,
    pub reply_to: Option<MessageId>,
}

/// Posting client that accepts posts in memory.
///
/// The first `rate_limits` attempts are rejected as rate limited; when
/// `fail_at` is set, the post at that zero-based position fails hard.
#[derive(Default)]
pub struct MockPostingClient {
    posts: Mutex<Vec<PostedMessage>>,
    attempts: AtomicUsize,
    rate_limits: usize,
    fail_at: Option<usize>,
}

impl MockPostingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate_limits(mut self, times: usize) -> Self {
        self.rate_limits = times;
        self
    }

    pub fn failing_at(mut self, position: usize) -> Self {
        self.fail_at = Some(position);
        self
    }

    /// Posts accepted so far
    pub fn posts(&self) -> Vec<PostedMessage> {
        self.posts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Every call to `post`, including rejected ones
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PostingClient for MockPostingClient {
    async fn post(&self, text: &str, reply_to: Option<&MessageId>) -> Result<MessageId, PostError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.rate_limits {
            return Err(PostError::RateLimited { reset_at: None });
        }

        let mut posts = self
            .posts
            .lock()
            .map_err(|_| PostError::Request("mock state poisoned".to_string()))?;
        if self.fail_at == Some(posts.len()) {
            return Err(PostError::Api {
                status: 403,
                body: "duplicate content".to_string(),
            });
        }

        let id = MessageId(format!("mock-{}", posts.len() + 1));
        posts.push(PostedMessage {
            id: id.clone(),
            text: text.to_string(),
            reply_to: reply_to.cloned(),
        });
        Ok(id)
    }
}
