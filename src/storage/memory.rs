//! In-memory object store

use super::sqlite::DEFAULT_PAGE_SIZE;
use super::traits::{ListPage, ObjectMeta, ObjectStore, StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    last_modified: DateTime<Utc>,
}

/// Object store held in a concurrent map.
///
/// Used by tests and by single-process runs that don't need persistence.
/// Listing honours the same pagination contract as the SQLite backend, with
/// a configurable page size so multi-page listings can be exercised.
#[derive(Debug)]
pub struct MemoryObjectStore {
    objects: DashMap<String, StoredObject>,
    page_size: usize,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the listing page size (minimum 1)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> StorageResult<()> {
        self.objects.insert(
            key.to_string(),
            StoredObject {
                body,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.objects
            .get(key)
            .map(|o| o.body.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list_page(&self, prefix: &str, continuation: Option<&str>) -> StorageResult<ListPage> {
        let mut objects: Vec<ObjectMeta> = self
            .objects
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .filter(|entry| continuation.map_or(true, |after| entry.key().as_str() > after))
            .map(|entry| ObjectMeta {
                key: entry.key().clone(),
                size: entry.body.len(),
                last_modified: entry.last_modified,
            })
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));

        let next = if objects.len() > self.page_size {
            objects.truncate(self.page_size);
            objects.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListPage { objects, next })
    }

    async fn copy(&self, source: &str, dest: &str) -> StorageResult<()> {
        let body = self.get(source).await?;
        self.put(dest, body).await
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.remove(key).is_some())
    }
}
