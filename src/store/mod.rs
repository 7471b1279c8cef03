//! Cache partition storage.
//!
//! The worker persists responses through the `CacheStore` / `CachePartition`
//! traits so the same strategies run over an in-memory map in tests and a
//! directory tree in production.

pub mod disk;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::WorkerResult;
use crate::models::{CacheKey, CachedResponse};

pub use disk::DiskStore;
pub use memory::MemoryStore;

/// A collection of named cache partitions.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open a partition, creating it if absent
    async fn open(&self, name: &str) -> WorkerResult<Arc<dyn CachePartition>>;

    /// Names of every existing partition
    async fn list(&self) -> WorkerResult<Vec<String>>;

    /// Delete a partition and everything in it. Returns whether it existed.
    async fn delete(&self, name: &str) -> WorkerResult<bool>;
}

/// One named partition: a key-value store of cached responses.
///
/// Writes are whole-entry replaces with per-key last-write-wins. Matching is
/// by method + URL only.
#[async_trait]
pub trait CachePartition: Send + Sync {
    async fn get(&self, key: &CacheKey) -> WorkerResult<Option<CachedResponse>>;

    async fn put(&self, entry: CachedResponse) -> WorkerResult<()>;

    /// Keys of every entry, in unspecified order
    async fn keys(&self) -> WorkerResult<Vec<CacheKey>>;

    async fn len(&self) -> WorkerResult<usize>;
}
