//! Object store wrapper counting calls per operation

use async_trait::async_trait;
use paperthread::storage::{ListPage, StorageResult};
use paperthread::{MemoryObjectStore, ObjectStore};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
pub struct CountingStore {
    inner: MemoryObjectStore,
    puts: AtomicUsize,
    copies: AtomicUsize,
    lists: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn copies(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }

    /// Listing pages requested so far
    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.puts.store(0, Ordering::SeqCst);
        self.copies.store(0, Ordering::SeqCst);
        self.lists.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for CountingStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, body).await
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.inner.get(key).await
    }

    async fn list_page(&self, prefix: &str, continuation: Option<&str>) -> StorageResult<ListPage> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list_page(prefix, continuation).await
    }

    async fn copy(&self, source: &str, dest: &str) -> StorageResult<()> {
        self.copies.fetch_add(1, Ordering::SeqCst);
        self.inner.copy(source, dest).await
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        self.inner.delete(key).await
    }
}
