//! Publishes a segmented thread as a reply chain

use super::{MessageId, PostError, PostingClient};
use crate::retry::{with_backoff, BackoffPolicy};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Ids of a published thread, in posting order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PostedThread {
    pub ids: Vec<MessageId>,
}

impl PostedThread {
    pub fn head(&self) -> Option<&MessageId> {
        self.ids.first()
    }
}

pub struct ThreadPoster {
    client: Arc<dyn PostingClient>,
    pause: Duration,
    backoff: BackoffPolicy,
}

impl ThreadPoster {
    pub fn new(client: Arc<dyn PostingClient>) -> Self {
        Self {
            client,
            pause: Duration::from_secs(2),
            backoff: BackoffPolicy::default(),
        }
    }

    /// Pause between consecutive posts of one thread
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Post every segment, each replying to the previous one.
    ///
    /// Rate limits are waited out per segment; any other failure stops the
    /// thread and is returned.
    pub async fn post_thread(&self, segments: &[String]) -> Result<PostedThread, PostError> {
        let mut thread = PostedThread::default();

        for (i, text) in segments.iter().enumerate() {
            if i > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }

            let reply_to = thread.ids.last().cloned();
            let deadline = self.backoff.deadline_from(Instant::now());
            let id = with_backoff(&self.backoff, deadline, || {
                self.client.post(text, reply_to.as_ref())
            })
            .await
            .map_err(|e| e.into_inner())?;

            debug!(position = i + 1, id = %id, "Posted segment");
            thread.ids.push(id);
        }

        if let Some(head) = thread.head() {
            info!(head = %head, posts = thread.ids.len(), "Thread posted");
        }
        Ok(thread)
    }
}
