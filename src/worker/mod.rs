//! Worker lifecycle: events, dispatch, and the cache manager itself.

pub mod events;
pub mod manager;

pub use events::{
    ActivationReport, EventKind, EventOutcome, FetchOutcome, InstallReport, LifecycleEvent,
    ServeSource,
};
pub use manager::{CacheWorker, WorkerPhase};
