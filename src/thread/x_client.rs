//! X (Twitter) API v2 posting client

use super::{MessageId, PostError, PostingClient};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

const X_API_URL: &str = "https://api.twitter.com";

#[derive(Debug, Serialize)]
struct CreateTweet<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<ReplySettings<'a>>,
}

#[derive(Debug, Serialize)]
struct ReplySettings<'a> {
    in_reply_to_tweet_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateTweetResponse {
    data: CreatedTweet,
}

#[derive(Debug, Deserialize)]
struct CreatedTweet {
    id: String,
}

/// Posts with an OAuth 2.0 user access token.
pub struct XClient {
    access_token: String,
    base_url: String,
    http: reqwest::Client,
}

impl XClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            base_url: X_API_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// `x-rate-limit-reset` carries the reset instant as epoch seconds
fn rate_limit_reset(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let secs = headers
        .get("x-rate-limit-reset")?
        .to_str()
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

#[async_trait]
impl PostingClient for XClient {
    async fn post(&self, text: &str, reply_to: Option<&MessageId>) -> Result<MessageId, PostError> {
        let body = CreateTweet {
            text,
            reply: reply_to.map(|id| ReplySettings {
                in_reply_to_tweet_id: &id.0,
            }),
        };

        let response = self
            .http
            .post(format!("{}/2/tweets", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| PostError::Request(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(PostError::RateLimited {
                reset_at: rate_limit_reset(response.headers()),
            });
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(PostError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreateTweetResponse = response
            .json()
            .await
            .map_err(|e| PostError::Parse(e.to_string()))?;
        debug!(id = %created.data.id, "Created post");
        Ok(MessageId(created.data.id))
    }
}
