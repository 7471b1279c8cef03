//! On-disk cache store.
//!
//! Layout: one directory per partition under the store root, one JSON entry
//! file per key. Entry files are named by the hex SHA-256 of the cache key
//! so arbitrary URLs map to safe fixed-length filenames. Writes go to a
//! uniquely named temp file and rename into place, so readers only ever see
//! whole entries.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::models::{CacheKey, CachedResponse};

use super::{CachePartition, CacheStore};

/// Counter distinguishing concurrent temp files for the same entry
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Store rooted at a directory, one subdirectory per partition.
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Create a store rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> WorkerResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| WorkerError::storage(format!("creating cache root {}", root.display()), e))?;
        Ok(Self { root })
    }

    /// Partition names become directory names, so restrict the alphabet
    fn validate_name(name: &str) -> WorkerResult<()> {
        let safe = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if safe {
            Ok(())
        } else {
            Err(WorkerError::partition_open(
                name,
                "partition names must be non-empty [A-Za-z0-9._-] and not start with '.'",
            ))
        }
    }
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn open(&self, name: &str) -> WorkerResult<Arc<dyn CachePartition>> {
        Self::validate_name(name)?;
        let dir = self.root.join(name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| WorkerError::partition_open(name, e.to_string()))?;
        Ok(Arc::new(DiskPartition { dir }))
    }

    async fn list(&self) -> WorkerResult<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => {
                return Err(WorkerError::storage(
                    format!("listing partitions in {}", self.root.display()),
                    e,
                ))
            }
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkerError::storage("reading partition listing", e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if is_dir {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> WorkerResult<bool> {
        Self::validate_name(name)?;
        let dir = self.root.join(name);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(WorkerError::storage(
                format!("deleting partition {}", name),
                e,
            )),
        }
    }
}

struct DiskPartition {
    dir: PathBuf,
}

impl DiskPartition {
    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.to_string().as_bytes());
        let digest = hex::encode(hasher.finalize());
        self.dir.join(format!("{}.json", digest))
    }
}

#[async_trait]
impl CachePartition for DiskPartition {
    async fn get(&self, key: &CacheKey) -> WorkerResult<Option<CachedResponse>> {
        let path = self.entry_path(key);
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(WorkerError::storage(
                    format!("reading entry for {}", key),
                    e,
                ))
            }
        };

        match serde_json::from_slice::<CachedResponse>(&contents) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                // Corrupt entries read as misses; the next store overwrites them
                warn!(key = %key, error = %e, "Corrupt cache entry, treating as miss");
                Ok(None)
            }
        }
    }

    async fn put(&self, entry: CachedResponse) -> WorkerResult<()> {
        let path = self.entry_path(&entry.key);
        let contents = serde_json::to_vec_pretty(&entry)?;

        let tmp = path.with_extension(format!(
            "tmp.{}.{}",
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        tokio::fs::write(&tmp, &contents)
            .await
            .map_err(|e| WorkerError::storage(format!("writing entry for {}", entry.key), e))?;

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(WorkerError::storage(
                format!("replacing entry for {}", entry.key),
                e,
            ));
        }

        debug!(key = %entry.key, path = %path.display(), "Stored cache entry");
        Ok(())
    }

    async fn keys(&self) -> WorkerResult<Vec<CacheKey>> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| WorkerError::storage(format!("listing {}", self.dir.display()), e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkerError::storage("reading entry listing", e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(key) = read_key(&path).await {
                keys.push(key);
            }
        }

        Ok(keys)
    }

    async fn len(&self) -> WorkerResult<usize> {
        Ok(self.keys().await?.len())
    }
}

/// Read just the key out of an entry file, skipping unreadable ones
async fn read_key(path: &Path) -> Option<CacheKey> {
    let contents = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice::<CachedResponse>(&contents) {
        Ok(entry) => Some(entry.key),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Skipping unreadable cache entry");
            None
        }
    }
}
