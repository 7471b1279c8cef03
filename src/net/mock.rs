//! Scripted fetcher for tests and offline simulation.
//!
//! Routes map URLs to fixed responses or injected transport failures; a
//! global offline switch fails every fetch. Per-URL counters let tests
//! assert exactly which requests hit the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{WorkerError, WorkerResult};
use crate::models::{Request, Response};

use super::Fetcher;

/// What a scripted route does when fetched
#[derive(Debug, Clone)]
enum Route {
    Respond(Response),
    Fail(String),
}

/// In-memory fetcher with scripted routes and failure injection.
#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, Route>>,
    counts: Mutex<HashMap<String, u32>>,
    offline: AtomicBool,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a URL to return the given response
    pub fn route(&self, url: impl Into<String>, response: Response) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.into(), Route::Respond(response));
    }

    /// Script a URL to fail with a transport error
    pub fn fail_route(&self, url: impl Into<String>, reason: impl Into<String>) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.into(), Route::Fail(reason.into()));
    }

    /// Fail every fetch regardless of routes, as if the network were down
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// How many times a URL has been fetched
    pub fn fetch_count(&self, url: &str) -> u32 {
        self.counts.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> WorkerResult<Response> {
        *self
            .counts
            .lock()
            .unwrap()
            .entry(request.url.clone())
            .or_insert(0) += 1;

        if self.offline.load(Ordering::SeqCst) {
            return Err(WorkerError::network(&request.url, "network offline"));
        }

        let route = self.routes.lock().unwrap().get(&request.url).cloned();
        match route {
            Some(Route::Respond(response)) => Ok(response),
            Some(Route::Fail(reason)) => Err(WorkerError::network(&request.url, reason)),
            None => Err(WorkerError::network(&request.url, "no route scripted")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_route_returns_response() {
        let fetcher = MockFetcher::new();
        fetcher.route("/app.js", Response::new(200).with_body(b"console.log(1)".to_vec()));

        let resp = fetcher.fetch(&Request::get("/app.js")).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(fetcher.fetch_count("/app.js"), 1);
    }

    #[tokio::test]
    async fn test_offline_fails_every_route() {
        let fetcher = MockFetcher::new();
        fetcher.route("/app.js", Response::new(200));
        fetcher.set_offline(true);

        let err = fetcher.fetch(&Request::get("/app.js")).await.unwrap_err();
        assert!(matches!(err, WorkerError::NetworkFailure { .. }));
    }

    #[tokio::test]
    async fn test_unscripted_url_is_transport_failure() {
        let fetcher = MockFetcher::new();
        let err = fetcher.fetch(&Request::get("/missing")).await.unwrap_err();
        assert!(matches!(err, WorkerError::NetworkFailure { .. }));
    }
}
