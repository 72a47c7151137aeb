//! Claude summarizer over the Anthropic Messages API

use super::{SummarizeError, Summarizer};
use crate::article::{Article, Summary};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20240620";

/// Anthropic's "overloaded" status, treated like 429
const STATUS_OVERLOADED: u16 = 529;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<WireMessage>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// JSON object the prompt asks the model to return
#[derive(Debug, Deserialize)]
struct SummaryPayload {
    summary: String,
    #[serde(default)]
    hashtags: HashtagField,
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum HashtagField {
    List(Vec<String>),
    Text(String),
    #[default]
    Missing,
}

/// Summarizer backed by Claude.
pub struct ClaudeSummarizer {
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    base_url: String,
    http: reqwest::Client,
}

impl ClaudeSummarizer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 400,
            temperature: 0.7,
            base_url: ANTHROPIC_API_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn headers(&self) -> Result<HeaderMap, SummarizeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| SummarizeError::Request(format!("invalid API key header: {}", e)))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

/// Prompt asking for a short summary and hashtags as a single JSON object
pub(crate) fn build_prompt(article: &Article) -> String {
    format!(
        "You are a social media assistant tasked with summarizing AI research and generating hashtags.\n\n\
         Task:\n\
         1. Summarize the research in 2-4 engaging sentences suitable for a tweet.\n\
         2. Generate 3-5 relevant and concise hashtags.\n\n\
         Only return a valid JSON object. Do not include any explanation, markdown formatting, or commentary.\n\n\
         Required JSON format:\n\
         {{\"summary\": \"your summary here\", \"hashtags\": [\"#tag1\", \"#tag2\"]}}\n\n\
         Paper Information:\n\
         Title: {}\n\
         Authors: {}\n\
         Abstract: {}",
        article.title,
        article.authors.join(", "),
        article.snippet
    )
}

fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

fn normalize_hashtag(raw: &str) -> Option<String> {
    let tag = raw.trim().trim_matches('"').trim_start_matches('#');
    if tag.is_empty() || tag.contains(char::is_whitespace) {
        return None;
    }
    Some(format!("#{}", tag))
}

/// Parse the model's text reply into a `Summary`.
///
/// Accepts the JSON object with or without a markdown fence, and falls back
/// to the outermost `{...}` span when the model adds surrounding prose.
/// Hashtags may come back as a list or a whitespace-separated string.
pub fn parse_summary_response(text: &str) -> Result<Summary, SummarizeError> {
    let cleaned = strip_code_blocks(text);
    let payload: SummaryPayload = match serde_json::from_str(cleaned) {
        Ok(payload) => payload,
        Err(first_err) => {
            let start = cleaned.find('{');
            let end = cleaned.rfind('}');
            match (start, end) {
                (Some(start), Some(end)) if start < end => {
                    serde_json::from_str(&cleaned[start..=end])
                        .map_err(|e| SummarizeError::Parse(e.to_string()))?
                }
                _ => return Err(SummarizeError::Parse(first_err.to_string())),
            }
        }
    };

    let summary = payload.summary.trim().to_string();
    if summary.is_empty() {
        return Err(SummarizeError::EmptySummary);
    }

    let hashtags = match payload.hashtags {
        HashtagField::List(tags) => tags.iter().filter_map(|t| normalize_hashtag(t)).collect(),
        HashtagField::Text(text) => text.split_whitespace().filter_map(normalize_hashtag).collect(),
        HashtagField::Missing => Vec::new(),
    };

    Ok(Summary::new(summary, hashtags))
}

fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl Summarizer for ClaudeSummarizer {
    async fn summarize(&self, article: &Article) -> Result<Summary, SummarizeError> {
        let url = format!("{}/messages", self.base_url);
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: vec![WireMessage {
                role: "user",
                content: build_prompt(article),
            }],
        };

        debug!(model = %self.model, url = %article.url, "Claude summary request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| SummarizeError::Request(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == STATUS_OVERLOADED {
            return Err(SummarizeError::RateLimited {
                retry_after: retry_after_header(response.headers()),
            });
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(SummarizeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| SummarizeError::Parse(e.to_string()))?;
        let text: String = parsed
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join(" ");

        parse_summary_response(&text)
    }
}
