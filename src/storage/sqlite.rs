//! SQLite storage backend for the object store

use super::traits::{ListPage, ObjectMeta, ObjectStore, OpenStore, StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Default number of keys returned per listing page
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// SQLite-backed object store
///
/// Uses a single table keyed by object key. Thread-safe via internal mutex
/// on the connection. Listing is paginated by key order; the continuation
/// token is the last key of the previous page.
pub struct SqliteObjectStore {
    conn: Mutex<Connection>,
    page_size: usize,
}

impl SqliteObjectStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS objects (
                key TEXT PRIMARY KEY,
                body BLOB NOT NULL,
                last_modified TEXT NOT NULL
            );

            -- Enable WAL mode so readers are not blocked by the writer
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Override the listing page size (minimum 1)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StorageError::DateParse(format!("{}: {}", raw, e)))
    }
}

impl OpenStore for SqliteObjectStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        Self::from_connection(Connection::open(path)?)
    }

    fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }
}

#[async_trait]
impl ObjectStore for SqliteObjectStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO objects (key, body, last_modified)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                body = excluded.body,
                last_modified = excluded.last_modified
            "#,
            params![key, body, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT body FROM objects WHERE key = ?1",
            params![key],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .optional()?
        .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list_page(&self, prefix: &str, continuation: Option<&str>) -> StorageResult<ListPage> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT key, length(body), last_modified FROM objects
            WHERE substr(key, 1, length(?1)) = ?1 AND key > ?2
            ORDER BY key
            LIMIT ?3
            "#,
        )?;
        // Fetch one extra row to learn whether another page follows
        let limit = (self.page_size + 1) as i64;
        let rows = stmt.query_map(params![prefix, continuation.unwrap_or(""), limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut objects = Vec::new();
        for row in rows {
            let (key, size, last_modified) = row?;
            objects.push(ObjectMeta {
                key,
                size: size.max(0) as usize,
                last_modified: Self::parse_timestamp(&last_modified)?,
            });
        }

        let next = if objects.len() > self.page_size {
            objects.truncate(self.page_size);
            objects.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListPage { objects, next })
    }

    async fn copy(&self, source: &str, dest: &str) -> StorageResult<()> {
        let conn = self.conn()?;
        let copied = conn.execute(
            r#"
            INSERT INTO objects (key, body, last_modified)
            SELECT ?2, body, ?3 FROM objects WHERE key = ?1
            ON CONFLICT(key) DO UPDATE SET
                body = excluded.body,
                last_modified = excluded.last_modified
            "#,
            params![source, dest, Utc::now().to_rfc3339()],
        )?;
        if copied == 0 {
            return Err(StorageError::NotFound(source.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM objects WHERE key = ?1", params![key])?;
        Ok(deleted > 0)
    }
}
