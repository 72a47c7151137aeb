//! Seen-articles library, the deduplication memory
//!
//! A single JSON object `url -> Article` kept at one fixed key. Scraped
//! batches are filtered against it; new articles are merged in and the
//! whole library is written back before the new subset is handed on.

use crate::article::Article;
use crate::storage::{ObjectStore, StorageError};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from library reads and writes.
///
/// "Not found" on read is never an error: it means first run.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("failed to read article library at {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: StorageError,
    },
    #[error("article library at {key} is not valid JSON: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode article library: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to write article library at {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: StorageError,
    },
}

/// Library contents, ordered by url so writes are deterministic
pub type SeenArticles = BTreeMap<String, Article>;

/// Result of filtering one scraped batch
#[derive(Debug, Clone, Serialize)]
pub struct DedupOutcome {
    /// Articles never seen before, in scrape order
    pub new: Vec<Article>,
    /// Number of scraped articles that were already known
    pub already_seen: usize,
    /// Library size after merging
    pub library_size: usize,
    /// Whether the library was written
    pub persisted: bool,
}

/// The persisted deduplication store.
pub struct ArticleLibrary {
    store: Arc<dyn ObjectStore>,
    key: String,
}

impl ArticleLibrary {
    pub fn new(store: Arc<dyn ObjectStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Fetch the library; a missing key yields an empty library.
    pub async fn load(&self) -> Result<SeenArticles, LibraryError> {
        match self.store.get(&self.key).await {
            Ok(body) => serde_json::from_slice(&body).map_err(|source| LibraryError::Decode {
                key: self.key.clone(),
                source,
            }),
            Err(e) if e.is_not_found() => {
                warn!(key = %self.key, "No article library found, starting a new one");
                Ok(SeenArticles::new())
            }
            Err(source) => Err(LibraryError::Read {
                key: self.key.clone(),
                source,
            }),
        }
    }

    /// Replace the stored library with `seen`.
    pub async fn save(&self, seen: &SeenArticles) -> Result<(), LibraryError> {
        let body = serde_json::to_vec_pretty(seen).map_err(LibraryError::Encode)?;
        self.store
            .put(&self.key, body)
            .await
            .map_err(|source| LibraryError::Write {
                key: self.key.clone(),
                source,
            })?;
        info!(key = %self.key, tracked = seen.len(), "Updated article library");
        Ok(())
    }

    /// Split a scraped batch into new and already-seen articles.
    ///
    /// New articles are merged and the library is persisted before they are
    /// returned; if the write fails the batch is not considered processed.
    /// A url repeated within the batch counts as seen after its first
    /// occurrence.
    pub async fn filter_new(&self, scraped: Vec<Article>) -> Result<DedupOutcome, LibraryError> {
        let mut seen = self.load().await?;
        let total = scraped.len();

        let mut batch_urls = HashSet::new();
        let mut new = Vec::new();
        for article in scraped {
            if seen.contains_key(article.identity()) || !batch_urls.insert(article.url.clone()) {
                debug!(url = %article.url, "Article already seen, skipping");
                continue;
            }
            new.push(article);
        }

        if new.is_empty() {
            info!(
                scraped = total,
                tracked = seen.len(),
                "No new articles found"
            );
            return Ok(DedupOutcome {
                new,
                already_seen: total,
                library_size: seen.len(),
                persisted: false,
            });
        }

        info!(new = new.len(), scraped = total, "Found new articles, adding to library");
        for article in &new {
            seen.insert(article.url.clone(), article.clone());
        }
        self.save(&seen).await?;

        Ok(DedupOutcome {
            already_seen: total - new.len(),
            library_size: seen.len(),
            persisted: true,
            new,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ListPage, MemoryObjectStore, StorageResult};
    use async_trait::async_trait;

    fn article(n: u32) -> Article {
        Article::new(format!("Paper {}", n), format!("https://arxiv.org/abs/{}", n))
    }

    fn library() -> (Arc<MemoryObjectStore>, ArticleLibrary) {
        let store = Arc::new(MemoryObjectStore::new());
        let library = ArticleLibrary::new(store.clone(), "memory/article_library.json");
        (store, library)
    }

    #[tokio::test]
    async fn first_run_treats_missing_library_as_empty() {
        let (_, library) = library();
        assert!(library.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn new_articles_are_persisted_before_return() {
        let (store, library) = library();
        let outcome = library.filter_new(vec![article(1), article(2)]).await.unwrap();

        assert_eq!(outcome.new, vec![article(1), article(2)]);
        assert!(outcome.persisted);
        assert_eq!(outcome.library_size, 2);

        let stored: SeenArticles =
            serde_json::from_slice(&store.get("memory/article_library.json").await.unwrap())
                .unwrap();
        assert_eq!(stored.get("https://arxiv.org/abs/2"), Some(&article(2)));
    }

    #[tokio::test]
    async fn same_batch_twice_yields_nothing_new() {
        let (_, library) = library();
        let batch = vec![article(1), article(2), article(3)];
        let first = library.filter_new(batch.clone()).await.unwrap();
        assert_eq!(first.new.len(), 3);

        let second = library.filter_new(batch).await.unwrap();
        assert!(second.new.is_empty());
        assert_eq!(second.already_seen, 3);
        assert!(!second.persisted);
    }

    #[tokio::test]
    async fn partially_seen_batch_keeps_order_of_new_items() {
        let (_, library) = library();
        library.filter_new(vec![article(2)]).await.unwrap();
        let outcome = library
            .filter_new(vec![article(3), article(2), article(1)])
            .await
            .unwrap();
        assert_eq!(outcome.new, vec![article(3), article(1)]);
        assert_eq!(outcome.already_seen, 1);
        assert_eq!(outcome.library_size, 3);
    }

    #[tokio::test]
    async fn duplicates_within_a_batch_count_once() {
        let (_, library) = library();
        let outcome = library
            .filter_new(vec![article(1), article(1)])
            .await
            .unwrap();
        assert_eq!(outcome.new, vec![article(1)]);
        assert_eq!(outcome.already_seen, 1);
    }

    #[tokio::test]
    async fn empty_batch_is_a_noop() {
        let (store, library) = library();
        let outcome = library.filter_new(Vec::new()).await.unwrap();
        assert!(outcome.new.is_empty());
        assert!(!outcome.persisted);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn corrupt_library_is_fatal() {
        let (store, library) = library();
        store
            .put("memory/article_library.json", b"not json".to_vec())
            .await
            .unwrap();
        let err = library.filter_new(vec![article(1)]).await.unwrap_err();
        assert!(matches!(err, LibraryError::Decode { .. }));
    }

    /// Store whose reads succeed as "missing" but whose writes always fail
    struct ReadOnlyStore;

    #[async_trait]
    impl ObjectStore for ReadOnlyStore {
        async fn put(&self, _key: &str, _body: Vec<u8>) -> StorageResult<()> {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }
        async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
            Err(StorageError::NotFound(key.to_string()))
        }
        async fn list_page(&self, _prefix: &str, _c: Option<&str>) -> StorageResult<ListPage> {
            Ok(ListPage::default())
        }
        async fn copy(&self, source: &str, _dest: &str) -> StorageResult<()> {
            Err(StorageError::NotFound(source.to_string()))
        }
        async fn delete(&self, _key: &str) -> StorageResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn write_failure_surfaces_to_caller() {
        let library = ArticleLibrary::new(Arc::new(ReadOnlyStore), "lib.json");
        let err = library.filter_new(vec![article(1)]).await.unwrap_err();
        assert!(matches!(err, LibraryError::Write { .. }));
    }
}
