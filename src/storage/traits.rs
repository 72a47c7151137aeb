//! Object store trait definitions

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// True if the error only signals that the key does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Metadata for one listed object
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: usize,
    pub last_modified: DateTime<Utc>,
}

/// One page of a prefix listing.
///
/// Objects are ordered by key. `next` is the continuation token for the
/// following page, `None` on the last page.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectMeta>,
    pub next: Option<String>,
}

/// Trait for object storage backends
///
/// The pipeline treats the store as a write-once, read-many coordination
/// medium: chunk artifacts are uniquely keyed and never rewritten, the
/// article library is only ever replaced in full.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create or replace the object at `key`
    async fn put(&self, key: &str, body: Vec<u8>) -> StorageResult<()>;

    /// Read an object. Missing keys yield `StorageError::NotFound`.
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// List one page of keys starting with `prefix`, after `continuation`
    async fn list_page(&self, prefix: &str, continuation: Option<&str>) -> StorageResult<ListPage>;

    /// Copy `source` to `dest`, replacing `dest` if present
    async fn copy(&self, source: &str, dest: &str) -> StorageResult<()>;

    /// Delete an object, returning whether it existed
    async fn delete(&self, key: &str) -> StorageResult<bool>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: ObjectStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}

/// Drain every page of a prefix listing.
pub async fn list_all(store: &dyn ObjectStore, prefix: &str) -> StorageResult<Vec<ObjectMeta>> {
    let mut objects = Vec::new();
    let mut continuation: Option<String> = None;
    loop {
        let page = store.list_page(prefix, continuation.as_deref()).await?;
        objects.extend(page.objects);
        match page.next {
            Some(next) => continuation = Some(next),
            None => break,
        }
    }
    Ok(objects)
}

/// Read and decode a JSON object.
pub async fn get_json<T: DeserializeOwned>(store: &dyn ObjectStore, key: &str) -> StorageResult<T> {
    let body = store.get(key).await?;
    Ok(serde_json::from_slice(&body)?)
}

/// Encode a value as pretty JSON and store it.
pub async fn put_json<T: Serialize + Sync>(
    store: &dyn ObjectStore,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let body = serde_json::to_vec_pretty(value)?;
    store.put(key, body).await
}
