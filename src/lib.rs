//! shellcache - offline cache manager for the Streamlite app shell.
//!
//! Implements the app's three caching strategies over pluggable storage and
//! network backends:
//!
//! - precache-on-install for the static shell, all-or-nothing
//! - cache-first for static subresources
//! - stale-while-revalidate for images
//! - network-first navigation with an offline fallback document
//!
//! Partitions are versioned per generation; activation deletes everything
//! from older generations.

pub mod classify;
pub mod config;
pub mod error;
pub mod models;
pub mod net;
pub mod store;
pub mod watchlist;
pub mod worker;

pub use classify::{classify, RequestKind};
pub use config::{AppConfig, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use models::{CacheKey, CachedResponse, Request, Response};
pub use net::{Fetcher, HttpFetcher, MockFetcher};
pub use store::{CachePartition, CacheStore, DiskStore, MemoryStore};
pub use watchlist::WatchList;
pub use worker::{
    ActivationReport, CacheWorker, EventOutcome, FetchOutcome, InstallReport, LifecycleEvent,
    ServeSource, WorkerPhase,
};
