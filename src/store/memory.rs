//! In-memory cache store for tests and ephemeral use.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::WorkerResult;
use crate::models::{CacheKey, CachedResponse};

use super::{CachePartition, CacheStore};

/// Store backed by per-partition `HashMap`s behind async locks.
#[derive(Default)]
pub struct MemoryStore {
    partitions: RwLock<HashMap<String, Arc<MemoryPartition>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn open(&self, name: &str) -> WorkerResult<Arc<dyn CachePartition>> {
        let mut partitions = self.partitions.write().await;
        let partition = partitions
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryPartition::default()))
            .clone();
        Ok(partition)
    }

    async fn list(&self) -> WorkerResult<Vec<String>> {
        let partitions = self.partitions.read().await;
        let mut names: Vec<String> = partitions.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> WorkerResult<bool> {
        let mut partitions = self.partitions.write().await;
        Ok(partitions.remove(name).is_some())
    }
}

#[derive(Default)]
struct MemoryPartition {
    entries: RwLock<HashMap<CacheKey, CachedResponse>>,
}

#[async_trait]
impl CachePartition for MemoryPartition {
    async fn get(&self, key: &CacheKey) -> WorkerResult<Option<CachedResponse>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, entry: CachedResponse) -> WorkerResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn keys(&self) -> WorkerResult<Vec<CacheKey>> {
        let entries = self.entries.read().await;
        Ok(entries.keys().cloned().collect())
    }

    async fn len(&self) -> WorkerResult<usize> {
        let entries = self.entries.read().await;
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Response;

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let store = MemoryStore::new();
        let a = store.open("static-v1").await.unwrap();
        a.put(CachedResponse::new(
            CacheKey::get("/index.html"),
            Response::new(200),
        ))
        .await
        .unwrap();

        // Reopening returns the same partition, not a fresh one
        let b = store.open("static-v1").await.unwrap();
        assert_eq!(b.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_put_replaces_entry() {
        let store = MemoryStore::new();
        let partition = store.open("images-v1").await.unwrap();
        let key = CacheKey::get("/poster.png");

        partition
            .put(CachedResponse::new(key.clone(), Response::new(200).with_body(b"old".to_vec())))
            .await
            .unwrap();
        partition
            .put(CachedResponse::new(key.clone(), Response::new(200).with_body(b"new".to_vec())))
            .await
            .unwrap();

        let entry = partition.get(&key).await.unwrap().unwrap();
        assert_eq!(entry.response.body, b"new");
        assert_eq!(partition.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let store = MemoryStore::new();
        store.open("static-v1").await.unwrap();
        store.open("images-v1").await.unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["images-v1", "static-v1"]);
        assert!(store.delete("static-v1").await.unwrap());
        assert!(!store.delete("static-v1").await.unwrap());
        assert_eq!(store.list().await.unwrap(), vec!["images-v1"]);
    }

    #[tokio::test]
    async fn test_miss_is_none() {
        let store = MemoryStore::new();
        let partition = store.open("static-v1").await.unwrap();
        assert!(partition.get(&CacheKey::get("/nope")).await.unwrap().is_none());
    }
}
