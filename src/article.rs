//! Article records flowing through the pipeline

use serde::{Deserialize, Serialize};

/// Summary text recorded for an article the summarizer could not handle.
pub const SUMMARY_UNAVAILABLE: &str = "[Summary unavailable]";

/// One scraped research article.
///
/// `url` is the identity: it never changes once scraped and is the only key
/// the seen-articles library dedupes on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub authors: Vec<String>,
    /// Abstract text as scraped
    #[serde(default)]
    pub snippet: String,
    /// Publication date as displayed by the source
    #[serde(default)]
    pub published: String,
}

impl Article {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            authors: Vec::new(),
            snippet: String::new(),
            published: String::new(),
        }
    }

    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors;
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn with_published(mut self, published: impl Into<String>) -> Self {
        self.published = published.into();
        self
    }

    /// Identity used for deduplication
    pub fn identity(&self) -> &str {
        &self.url
    }
}

/// Generated summary plus topical tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub text: String,
    pub hashtags: Vec<String>,
}

impl Summary {
    pub fn new(text: impl Into<String>, hashtags: Vec<String>) -> Self {
        Self {
            text: text.into(),
            hashtags,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    Summarized,
    Unavailable,
}

/// An article enriched with its summary.
///
/// The original article fields are flattened into the record unchanged;
/// enrichment only adds `summary`, `hashtags` and `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizedArticle {
    #[serde(flatten)]
    pub article: Article,
    pub summary: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub status: SummaryStatus,
}

impl SummarizedArticle {
    pub fn summarized(article: Article, summary: Summary) -> Self {
        Self {
            article,
            summary: summary.text,
            hashtags: summary.hashtags,
            status: SummaryStatus::Summarized,
        }
    }

    /// Record an article whose summary could not be produced.
    pub fn unavailable(article: Article) -> Self {
        Self {
            article,
            summary: SUMMARY_UNAVAILABLE.to_string(),
            hashtags: Vec::new(),
            status: SummaryStatus::Unavailable,
        }
    }

    pub fn is_summarized(&self) -> bool {
        self.status == SummaryStatus::Summarized
    }
}
