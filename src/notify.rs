//! Run notifications
//!
//! Delivery is best effort: a failed notification is logged and never
//! changes the outcome of the run that triggered it.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook returned HTTP {0}")]
    Status(u16),
}

/// Message sent when a run finishes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub message: String,
    /// Titles of the articles the run handled
    pub articles: Vec<String>,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Posts notifications as JSON to a webhook url.
pub struct WebhookNotifier {
    url: String,
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(&self.url)
            .json(notification)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }
        debug!(url = %self.url, "Notification delivered");
        Ok(())
    }
}

/// Keeps notifications in memory.
#[derive(Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotificationSink for MemoryNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification.clone());
        }
        Ok(())
    }
}

/// Send through `sink`, logging instead of returning any failure.
pub async fn notify_best_effort(sink: &dyn NotificationSink, notification: &Notification) -> bool {
    match sink.notify(notification).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Notification failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DownSink;

    #[async_trait]
    impl NotificationSink for DownSink {
        async fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
            Err(NotifyError::Status(503))
        }
    }

    fn notification() -> Notification {
        Notification {
            message: "Posted 1 thread".into(),
            articles: vec!["Paper".into()],
        }
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        assert!(!notify_best_effort(&DownSink, &notification()).await);
    }

    #[tokio::test]
    async fn memory_sink_records() {
        let sink = MemoryNotifier::new();
        assert!(notify_best_effort(&sink, &notification()).await);
        assert_eq!(sink.sent(), vec![notification()]);
    }
}
