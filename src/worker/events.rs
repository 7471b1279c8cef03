//! Lifecycle events delivered by the host and what came of them.

use tokio::task::JoinHandle;

use crate::models::{Request, Response};

/// An event the host delivers to the worker.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// A new worker generation is being installed
    Install,
    /// The installed generation is taking over
    Activate,
    /// A page issued a resource request
    Fetch(Request),
}

impl LifecycleEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LifecycleEvent::Install => EventKind::Install,
            LifecycleEvent::Activate => EventKind::Activate,
            LifecycleEvent::Fetch(_) => EventKind::Fetch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Install => write!(f, "install"),
            EventKind::Activate => write!(f, "activate"),
            EventKind::Fetch => write!(f, "fetch"),
        }
    }
}

/// What a successful install did.
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// The static partition that was populated
    pub partition: String,
    /// How many manifest URLs were cached
    pub precached: usize,
    /// Whether the host should activate immediately
    pub skip_waiting: bool,
}

/// What activation kept and collected.
#[derive(Debug, Clone)]
pub struct ActivationReport {
    /// Current-generation partition names
    pub retained: Vec<String>,
    /// Stale partitions that were deleted
    pub removed: Vec<String>,
    /// Whether the host should apply the worker to open pages
    pub clients_claimed: bool,
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeSource {
    /// Live network response
    Network,
    /// Previously cached entry
    Cache,
    /// Synthesized offline placeholder
    Fallback,
}

impl std::fmt::Display for ServeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServeSource::Network => write!(f, "network"),
            ServeSource::Cache => write!(f, "cache"),
            ServeSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// A served response plus bookkeeping.
///
/// `revalidation` is set on stale-while-revalidate cache hits. Dropping the
/// handle leaves the refresh running detached; awaiting it observes the
/// refresh completing. It never carries an error: revalidation failures are
/// logged inside the task.
#[derive(Debug)]
pub struct FetchOutcome {
    pub response: Response,
    pub source: ServeSource,
    pub revalidation: Option<JoinHandle<()>>,
}

/// Result of dispatching one lifecycle event.
#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivationReport),
    Served(FetchOutcome),
}
