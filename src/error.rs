//! Error types for the cache worker.
//!
//! Library code returns `WorkerResult<T>`; the binary wraps these in anyhow
//! for top-level context.

use thiserror::Error;

/// Result type alias for worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Error, Debug)]
pub enum WorkerError {
    /// A precache manifest URL could not be fetched or stored during install.
    /// Install is all-or-nothing: one of these aborts the whole generation.
    #[error("Precache failed for {url}: {reason}")]
    PrecacheFailure { url: String, reason: String },

    #[error("Network failure for {url}: {reason}")]
    NetworkFailure { url: String, reason: String },

    #[error("Failed to open cache partition '{name}': {reason}")]
    PartitionOpenFailure { name: String, reason: String },

    #[error("Storage error: {context}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkerError {
    pub fn precache(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PrecacheFailure {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn network(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NetworkFailure {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn partition_open(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PartitionOpenFailure {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a storage error with context
    pub fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }
}
