//! Article scrapers
//!
//! Scrapers never fail past their boundary: fetch and parse problems are
//! logged and yield an empty batch, which the pipeline treats as "nothing
//! new".

use crate::article::Article;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use scraper::{ElementRef, Html, Selector};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const ARXIV_BASE_URL: &str = "https://arxiv.org";

/// arXiv search for recent AI papers in computer science, newest first
pub const DEFAULT_ARXIV_SEARCH_URL: &str = "https://arxiv.org/search/?query=artificial+intelligence&searchtype=all&abstracts=show&order=-announced_date_first&size=25&classification-computer_science=y";

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 14_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPad; CPU OS 14_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0 Mobile/15E148 Safari/604.1",
];

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("invalid selector {selector}: {message}")]
    Selector { selector: String, message: String },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid article list: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Source of article metadata.
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Fetch at most `limit` articles (all available when `None`).
    async fn scrape(&self, limit: Option<usize>) -> Vec<Article>;
}

fn selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|e| ScrapeError::Selector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}

fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

struct ArxivSelectors {
    result: Selector,
    link: Selector,
    title: Selector,
    authors: Selector,
    abstract_full: Selector,
    date: Selector,
}

impl ArxivSelectors {
    fn new() -> Result<Self, ScrapeError> {
        Ok(Self {
            result: selector("li.arxiv-result")?,
            link: selector("p.list-title a")?,
            title: selector("p.title.is-5.mathjax")?,
            authors: selector("p.authors a")?,
            abstract_full: selector("span.abstract-full.has-text-grey-dark.mathjax")?,
            date: selector("p.is-size-7")?,
        })
    }
}

/// Parse an arXiv search results page.
///
/// Results before `start` are skipped and at most `limit` articles are
/// returned. Entries without a title or link are ignored.
pub fn parse_arxiv_results(
    html: &str,
    base_url: &str,
    start: usize,
    limit: Option<usize>,
) -> Result<Vec<Article>, ScrapeError> {
    let selectors = ArxivSelectors::new()?;
    let document = Html::parse_document(html);
    let mut articles = Vec::new();

    for result in document.select(&selectors.result).skip(start) {
        if limit.is_some_and(|limit| articles.len() >= limit) {
            break;
        }

        let title = result.select(&selectors.title).next().map(text_of);
        let href = result
            .select(&selectors.link)
            .next()
            .and_then(|a| a.value().attr("href"));
        let (Some(title), Some(href)) = (title, href) else {
            continue;
        };

        let url = if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{}{}", base_url, href)
        };
        let authors = result.select(&selectors.authors).map(text_of).collect();
        let snippet = result
            .select(&selectors.abstract_full)
            .next()
            .map(text_of)
            .map(|s| s.trim_start_matches("Abstract:").trim().to_string())
            .unwrap_or_default();
        let published = result
            .select(&selectors.date)
            .next()
            .map(text_of)
            .and_then(|s| s.rsplit(": ").next().map(|d| d.trim().to_string()))
            .unwrap_or_default();

        articles.push(
            Article::new(title, url)
                .with_authors(authors)
                .with_snippet(snippet)
                .with_published(published),
        );
    }

    Ok(articles)
}

/// Scrapes arXiv search result pages.
pub struct ArxivScraper {
    search_url: String,
    base_url: String,
    start: usize,
    http: reqwest::Client,
}

impl ArxivScraper {
    pub fn new(search_url: impl Into<String>) -> Self {
        Self {
            search_url: search_url.into(),
            base_url: ARXIV_BASE_URL.to_string(),
            start: 0,
            http: reqwest::Client::new(),
        }
    }

    /// Skip the first `start` results of the page
    pub fn with_start(mut self, start: usize) -> Self {
        self.start = start;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn headers() -> HeaderMap {
        let agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(agent));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers
    }

    async fn fetch(&self, limit: Option<usize>) -> Result<Vec<Article>, ScrapeError> {
        let response = self
            .http
            .get(&self.search_url)
            .headers(Self::headers())
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                status: status.as_u16(),
                url: self.search_url.clone(),
            });
        }

        let html = response.text().await?;
        parse_arxiv_results(&html, &self.base_url, self.start, limit)
    }
}

#[async_trait]
impl Scraper for ArxivScraper {
    async fn scrape(&self, limit: Option<usize>) -> Vec<Article> {
        match self.fetch(limit).await {
            Ok(articles) => {
                info!(count = articles.len(), url = %self.search_url, "Scraped articles");
                articles
            }
            Err(e) => {
                warn!(url = %self.search_url, error = %e, "Scrape failed");
                Vec::new()
            }
        }
    }
}

/// Serves a fixed article list, e.g. a saved scrape snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticScraper {
    articles: Vec<Article>,
}

impl StaticScraper {
    pub fn new(articles: Vec<Article>) -> Self {
        Self { articles }
    }

    /// Load a JSON array of articles from disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ScrapeError> {
        let path = path.as_ref();
        let body = std::fs::read_to_string(path).map_err(|source| ScrapeError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::new(serde_json::from_str(&body)?))
    }
}

#[async_trait]
impl Scraper for StaticScraper {
    async fn scrape(&self, limit: Option<usize>) -> Vec<Article> {
        let take = limit.unwrap_or(self.articles.len());
        self.articles.iter().take(take).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PAGE: &str = r#"
    <html><body><ol>
      <li class="arxiv-result">
        <div><p class="list-title is-inline-block"><a href="https://arxiv.org/abs/2505.00001">arXiv:2505.00001</a></p></div>
        <p class="title is-5 mathjax">
          Sparse   Mixtures of Experts
        </p>
        <p class="authors"><span>Authors:</span><a href="/a/ada">Ada Lovelace</a>, <a href="/a/grace">Grace Hopper</a></p>
        <p class="abstract mathjax">
          <span class="abstract-full has-text-grey-dark mathjax">Abstract: We route tokens sparsely.</span>
        </p>
        <p class="is-size-7">Submitted 1 May, 2025; originally announced May 2025.</p>
      </li>
      <li class="arxiv-result">
        <p class="list-title"><a href="/abs/2505.00002">arXiv:2505.00002</a></p>
        <p class="title is-5 mathjax">Second Paper</p>
      </li>
      <li class="arxiv-result">
        <p class="title is-5 mathjax">No link here</p>
      </li>
      <li class="arxiv-result">
        <p class="list-title"><a href="/abs/2505.00004">arXiv:2505.00004</a></p>
        <p class="title is-5 mathjax">Fourth Paper</p>
      </li>
    </ol></body></html>
    "#;

    #[test]
    fn parses_result_fields() {
        let articles = parse_arxiv_results(PAGE, ARXIV_BASE_URL, 0, None).unwrap();
        assert_eq!(articles.len(), 3);

        let first = &articles[0];
        assert_eq!(first.title, "Sparse Mixtures of Experts");
        assert_eq!(first.url, "https://arxiv.org/abs/2505.00001");
        assert_eq!(first.authors, vec!["Ada Lovelace", "Grace Hopper"]);
        assert_eq!(first.snippet, "We route tokens sparsely.");
        assert_eq!(first.published, "1 May, 2025; originally announced May 2025.");

        assert_eq!(articles[1].url, "https://arxiv.org/abs/2505.00002");
        assert!(articles[1].authors.is_empty());
        assert_eq!(articles[2].title, "Fourth Paper");
    }

    #[test]
    fn start_and_limit_window_the_results() {
        let articles = parse_arxiv_results(PAGE, ARXIV_BASE_URL, 1, Some(1)).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Second Paper");
    }

    #[test]
    fn empty_page_yields_nothing() {
        let articles = parse_arxiv_results("<html></html>", ARXIV_BASE_URL, 0, Some(5)).unwrap();
        assert!(articles.is_empty());
    }

    #[tokio::test]
    async fn static_scraper_honours_limit() {
        let scraper = StaticScraper::new(vec![
            Article::new("A", "a"),
            Article::new("B", "b"),
            Article::new("C", "c"),
        ]);
        assert_eq!(scraper.scrape(Some(2)).await.len(), 2);
        assert_eq!(scraper.scrape(None).await.len(), 3);
    }

    #[test]
    fn static_scraper_reads_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"title": "A", "url": "https://arxiv.org/abs/1"}}]"#).unwrap();
        let scraper = StaticScraper::from_json_file(file.path()).unwrap();
        assert_eq!(scraper.articles.len(), 1);
        assert_eq!(scraper.articles[0].url, "https://arxiv.org/abs/1");
    }
}
