//! Outbound fetch abstraction.
//!
//! The worker never talks to the network directly; it goes through the
//! `Fetcher` trait so tests and offline simulation can substitute a
//! scripted backend.

pub mod client;
pub mod mock;

use async_trait::async_trait;

use crate::error::WorkerResult;
use crate::models::{Request, Response};

pub use client::HttpFetcher;
pub use mock::MockFetcher;

/// Abstract outbound fetch interface.
///
/// Transport failure (unreachable host, timeout) is `Err(NetworkFailure)`.
/// An HTTP error status is a *successful* fetch carrying that status; the
/// strategies decide what to do with it.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> WorkerResult<Response>;
}
