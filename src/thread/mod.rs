//! Threads: segmentation and posting
//!
//! `ThreadSegmenter` turns a summary into bounded-length posts;
//! `ThreadPoster` publishes them as a reply chain through a
//! `PostingClient`. Two clients:
//! - `XClient`: X API v2 over HTTP (production)
//! - `MockPostingClient`: records posts (testing)

mod mock;
mod poster;
mod segmenter;
mod x_client;

pub use mock::{MockPostingClient, PostedMessage};
pub use poster::{PostedThread, ThreadPoster};
pub use segmenter::{split_sentences, tag_block, ThreadSegmenter, DEFAULT_FALLBACK_TAG, DEFAULT_MAX_LEN};
pub use x_client::XClient;

use crate::retry::Retryable;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identifier the platform assigned to a published post
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PostError {
    #[error("rate limited by posting platform")]
    RateLimited { reset_at: Option<DateTime<Utc>> },
    #[error("request failed: {0}")]
    Request(String),
    #[error("posting API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Parse(String),
}

impl Retryable for PostError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited {
                reset_at: Some(reset_at),
            } => (*reset_at - Utc::now()).to_std().ok(),
            _ => None,
        }
    }
}

/// Client trait for publishing one post.
///
/// Implementations make a single attempt; `ThreadPoster` owns retries.
#[async_trait]
pub trait PostingClient: Send + Sync {
    /// Publish `text`, as a reply to `reply_to` when given.
    async fn post(&self, text: &str, reply_to: Option<&MessageId>) -> Result<MessageId, PostError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn reset_time_becomes_retry_hint() {
        let err = PostError::RateLimited {
            reset_at: Some(Utc::now() + ChronoDuration::seconds(120)),
        };
        assert!(err.is_rate_limited());
        let hint = err.retry_after().unwrap();
        assert!(hint > Duration::from_secs(110) && hint <= Duration::from_secs(120));

        let past = PostError::RateLimited {
            reset_at: Some(Utc::now() - ChronoDuration::seconds(5)),
        };
        assert_eq!(past.retry_after(), None);
        assert!(!PostError::Request("x".into()).is_rate_limited());
    }
}
