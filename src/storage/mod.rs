//! Storage backends for paperthread
//!
//! The pipeline coordinates through an object store reached via the
//! `ObjectStore` trait. `SqliteObjectStore` is the persistent backend;
//! `MemoryObjectStore` backs tests and ephemeral runs.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryObjectStore;
pub use sqlite::{SqliteObjectStore, DEFAULT_PAGE_SIZE};
pub use traits::{
    get_json, list_all, put_json, ListPage, ObjectMeta, ObjectStore, OpenStore, StorageError,
    StorageResult,
};
