//! The offline cache manager.
//!
//! `CacheWorker` owns the worker configuration plus two injected backends
//! (partition store, fetcher) and implements the lifecycle:
//!
//! - install: precache the manifest into the static partition, all-or-nothing
//! - activate: delete partitions from older generations
//! - fetch: route each request to network-first, stale-while-revalidate, or
//!   cache-first based on its classification

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::classify::{classify, RequestKind};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::models::{CacheKey, CachedResponse, Request, Response};
use crate::net::Fetcher;
use crate::store::{CachePartition, CacheStore};

use super::events::{
    ActivationReport, EventOutcome, FetchOutcome, InstallReport, LifecycleEvent, ServeSource,
};

/// Maximum concurrent precache fetches during install.
/// 8 keeps install fast for shell-sized manifests without flooding the origin.
const PRECACHE_CONCURRENCY: usize = 8;

/// Where the worker is in its lifecycle. Observability only: handlers do not
/// gate on it, since partitions are durable across worker instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Idle,
    Installed,
    Active,
}

impl std::fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerPhase::Idle => write!(f, "idle"),
            WorkerPhase::Installed => write!(f, "installed"),
            WorkerPhase::Active => write!(f, "active"),
        }
    }
}

pub struct CacheWorker {
    config: WorkerConfig,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    phase: RwLock<WorkerPhase>,
}

impl CacheWorker {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> WorkerResult<Self> {
        config.validate()?;
        if !config.precache.contains(&config.navigation_fallback) {
            warn!(
                fallback = %config.navigation_fallback,
                "Navigation fallback is not in the precache manifest; offline navigations will only get the placeholder"
            );
        }
        Ok(Self {
            config,
            store,
            fetcher,
            phase: RwLock::new(WorkerPhase::Idle),
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub async fn phase(&self) -> WorkerPhase {
        *self.phase.read().await
    }

    /// Route one lifecycle event to its handler.
    ///
    /// The returned future is the extend-lifetime contract: the host must
    /// drive it to completion before tearing the worker down.
    pub async fn dispatch(&self, event: LifecycleEvent) -> WorkerResult<EventOutcome> {
        debug!(event = %event.kind(), "Dispatching lifecycle event");
        match event {
            LifecycleEvent::Install => Ok(EventOutcome::Installed(self.install().await?)),
            LifecycleEvent::Activate => Ok(EventOutcome::Activated(self.activate().await?)),
            LifecycleEvent::Fetch(request) => {
                Ok(EventOutcome::Served(self.handle_fetch(request).await?))
            }
        }
    }

    /// Precache the manifest into the current static partition.
    ///
    /// All-or-nothing: any fetch or store failure aborts the install and the
    /// partially filled static partition is discarded. Partitions of older
    /// generations are untouched; only a later successful activation removes
    /// them.
    pub async fn install(&self) -> WorkerResult<InstallReport> {
        let static_name = self.config.static_partition();
        info!(
            partition = %static_name,
            urls = self.config.precache.len(),
            "Installing"
        );

        let partition = self.store.open(&static_name).await?;

        let precache = stream::iter(self.config.precache.clone())
            .map(|url| {
                let partition = Arc::clone(&partition);
                async move { self.precache_url(partition, url).await }
            })
            .buffer_unordered(PRECACHE_CONCURRENCY)
            .try_collect::<Vec<()>>()
            .await;

        if let Err(e) = precache {
            // A partially filled partition must not survive a failed install
            if let Err(del) = self.store.delete(&static_name).await {
                warn!(partition = %static_name, error = %del, "Failed to discard partial partition");
            }
            return Err(e);
        }

        // Create the images partition up front so activation retains exactly
        // the two current names even before the first image is cached
        self.store.open(&self.config.image_partition()).await?;

        *self.phase.write().await = WorkerPhase::Installed;
        info!(partition = %static_name, precached = self.config.precache.len(), "Install complete");

        Ok(InstallReport {
            partition: static_name,
            precached: self.config.precache.len(),
            skip_waiting: self.config.skip_waiting,
        })
    }

    async fn precache_url(
        &self,
        partition: Arc<dyn CachePartition>,
        url: String,
    ) -> WorkerResult<()> {
        let request = Request::get(&url);
        let response = self
            .fetcher
            .fetch(&request)
            .await
            .map_err(|e| WorkerError::precache(&url, e.to_string()))?;

        if !response.is_success() {
            return Err(WorkerError::precache(
                &url,
                format!("status {}", response.status),
            ));
        }

        partition
            .put(CachedResponse::new(request.cache_key(), response))
            .await
            .map_err(|e| WorkerError::precache(&url, e.to_string()))?;

        debug!(url = %url, "Precached");
        Ok(())
    }

    /// Delete every partition that is not part of the current generation.
    pub async fn activate(&self) -> WorkerResult<ActivationReport> {
        let retained = self.config.current_partitions();
        let names = self.store.list().await?;

        let mut removed = Vec::new();
        for name in names {
            if retained.contains(&name) {
                continue;
            }
            self.store.delete(&name).await?;
            info!(partition = %name, "Removed stale partition");
            removed.push(name);
        }

        *self.phase.write().await = WorkerPhase::Active;

        Ok(ActivationReport {
            retained,
            removed,
            clients_claimed: self.config.claim_clients,
        })
    }

    /// Serve one intercepted request by its classification.
    pub async fn handle_fetch(&self, request: Request) -> WorkerResult<FetchOutcome> {
        let kind = classify(&request);
        debug!(url = %request.url, kind = %kind, "Routing fetch");
        match kind {
            RequestKind::Navigation => self.network_first_navigation(request).await,
            RequestKind::Image => self.stale_while_revalidate(request).await,
            RequestKind::Static => self.cache_first(request).await,
        }
    }

    /// Cache reads degrade to misses so a damaged entry never takes down a
    /// request that the network or fallback could still serve
    async fn lookup(
        &self,
        partition: &Arc<dyn CachePartition>,
        key: &CacheKey,
    ) -> Option<CachedResponse> {
        match partition.get(key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Navigations: live network first, cached shell on transport failure,
    /// synthesized placeholder when nothing is cached. Successful responses
    /// are never cached; the precached shell covers offline.
    async fn network_first_navigation(&self, request: Request) -> WorkerResult<FetchOutcome> {
        match self.fetcher.fetch(&request).await {
            Ok(response) => Ok(FetchOutcome {
                response,
                source: ServeSource::Network,
                revalidation: None,
            }),
            Err(e) => {
                warn!(url = %request.url, error = %e, "Navigation fetch failed, serving fallback");
                let partition = self.store.open(&self.config.static_partition()).await?;
                let fallback_key = CacheKey::get(&self.config.navigation_fallback);
                match self.lookup(&partition, &fallback_key).await {
                    Some(entry) => Ok(FetchOutcome {
                        response: entry.response,
                        source: ServeSource::Cache,
                        revalidation: None,
                    }),
                    None => Ok(FetchOutcome {
                        response: Response::offline_placeholder(),
                        source: ServeSource::Fallback,
                        revalidation: None,
                    }),
                }
            }
        }
    }

    /// Images: serve the cached copy immediately and refresh it in the
    /// background; on a miss, wait for the network.
    async fn stale_while_revalidate(&self, request: Request) -> WorkerResult<FetchOutcome> {
        let partition = self.store.open(&self.config.image_partition()).await?;
        let key = request.cache_key();

        if let Some(entry) = self.lookup(&partition, &key).await {
            debug!(url = %request.url, age = %entry.age_display(), "Serving cached image, revalidating");
            let handle = self.spawn_revalidation(Arc::clone(&partition), request);
            return Ok(FetchOutcome {
                response: entry.response,
                source: ServeSource::Cache,
                revalidation: Some(handle),
            });
        }

        let response = self.fetcher.fetch(&request).await?;
        if response.is_success() {
            partition
                .put(CachedResponse::new(key, response.clone()))
                .await?;
        }
        Ok(FetchOutcome {
            response,
            source: ServeSource::Network,
            revalidation: None,
        })
    }

    /// The refresh task is detached: its failures are logged and the cached
    /// entry stays as it was. Only 2xx responses replace the entry.
    fn spawn_revalidation(
        &self,
        partition: Arc<dyn CachePartition>,
        request: Request,
    ) -> JoinHandle<()> {
        let fetcher = Arc::clone(&self.fetcher);
        tokio::spawn(async move {
            let key = request.cache_key();
            match fetcher.fetch(&request).await {
                Ok(response) if response.is_success() => {
                    if let Err(e) = partition.put(CachedResponse::new(key, response)).await {
                        warn!(url = %request.url, error = %e, "Revalidation store failed");
                    } else {
                        debug!(url = %request.url, "Revalidated cached image");
                    }
                }
                Ok(response) => {
                    debug!(
                        url = %request.url,
                        status = response.status,
                        "Revalidation got error status, keeping cached entry"
                    );
                }
                Err(e) => {
                    debug!(url = %request.url, error = %e, "Revalidation fetch failed, keeping cached entry");
                }
            }
        })
    }

    /// Everything else: cached copy wins, network fills misses. A transport
    /// failure with nothing cached propagates to the caller.
    async fn cache_first(&self, request: Request) -> WorkerResult<FetchOutcome> {
        let partition = self.store.open(&self.config.static_partition()).await?;
        let key = request.cache_key();

        if let Some(entry) = self.lookup(&partition, &key).await {
            return Ok(FetchOutcome {
                response: entry.response,
                source: ServeSource::Cache,
                revalidation: None,
            });
        }

        let response = self.fetcher.fetch(&request).await?;
        if response.is_success() {
            partition
                .put(CachedResponse::new(key, response.clone()))
                .await?;
        }
        Ok(FetchOutcome {
            response,
            source: ServeSource::Network,
            revalidation: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::MockFetcher;
    use crate::store::MemoryStore;

    fn test_config(manifest: &[&str]) -> WorkerConfig {
        WorkerConfig {
            cache_prefix: "streamlite".to_string(),
            cache_version: 2,
            precache: manifest.iter().map(|s| s.to_string()).collect(),
            navigation_fallback: "/index.html".to_string(),
            skip_waiting: true,
            claim_clients: true,
        }
    }

    fn build_worker(config: WorkerConfig) -> (Arc<MemoryStore>, Arc<MockFetcher>, CacheWorker) {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(MockFetcher::new());
        let worker = CacheWorker::new(
            config,
            Arc::clone(&store) as Arc<dyn CacheStore>,
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
        )
        .unwrap();
        (store, fetcher, worker)
    }

    fn shell_response(body: &str) -> Response {
        Response::new(200)
            .with_header("content-type", "text/html")
            .with_body(body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_install_precaches_every_manifest_url() {
        let (store, fetcher, worker) = build_worker(test_config(&["/index.html", "/app.js"]));
        fetcher.route("/index.html", shell_response("shell"));
        fetcher.route("/app.js", Response::new(200).with_body(b"js".to_vec()));

        let report = worker.install().await.unwrap();
        assert_eq!(report.partition, "streamlite-static-v2");
        assert_eq!(report.precached, 2);
        assert!(report.skip_waiting);

        let partition = store.open("streamlite-static-v2").await.unwrap();
        assert_eq!(partition.len().await.unwrap(), 2);
        assert!(partition
            .get(&CacheKey::get("/index.html"))
            .await
            .unwrap()
            .is_some());
        assert!(partition.get(&CacheKey::get("/app.js")).await.unwrap().is_some());
        assert_eq!(worker.phase().await, WorkerPhase::Installed);
    }

    #[tokio::test]
    async fn test_install_aborts_on_error_status() {
        let (store, fetcher, worker) = build_worker(test_config(&["/index.html", "/app.js"]));
        fetcher.route("/index.html", shell_response("shell"));
        fetcher.route("/app.js", Response::new(404));

        let err = worker.install().await.unwrap_err();
        assert!(matches!(err, WorkerError::PrecacheFailure { .. }));

        // The partial partition was discarded and no images partition appeared
        assert!(store.list().await.unwrap().is_empty());
        assert_eq!(worker.phase().await, WorkerPhase::Idle);
    }

    #[tokio::test]
    async fn test_failed_install_preserves_prior_generation() {
        let (store, fetcher, worker) = build_worker(test_config(&["/index.html"]));

        // A previous generation is live
        let old = store.open("streamlite-static-v1").await.unwrap();
        old.put(CachedResponse::new(CacheKey::get("/index.html"), shell_response("old")))
            .await
            .unwrap();

        fetcher.set_offline(true);
        assert!(worker.install().await.is_err());

        let names = store.list().await.unwrap();
        assert_eq!(names, vec!["streamlite-static-v1"]);
        let entry = old.get(&CacheKey::get("/index.html")).await.unwrap().unwrap();
        assert_eq!(entry.response.body_text(), "old");
    }

    #[tokio::test]
    async fn test_activate_collects_stale_partitions() {
        let (store, fetcher, worker) = build_worker(test_config(&["/index.html"]));
        fetcher.route("/index.html", shell_response("shell"));

        // Leftovers from the previous generation plus a stray
        store.open("streamlite-static-v1").await.unwrap();
        store.open("streamlite-images-v1").await.unwrap();
        store.open("someone-elses-cache").await.unwrap();

        worker.install().await.unwrap();
        let report = worker.activate().await.unwrap();

        assert_eq!(
            report.retained,
            vec!["streamlite-static-v2", "streamlite-images-v2"]
        );
        let mut removed = report.removed.clone();
        removed.sort();
        assert_eq!(
            removed,
            vec![
                "someone-elses-cache",
                "streamlite-images-v1",
                "streamlite-static-v1"
            ]
        );
        assert!(report.clients_claimed);

        assert_eq!(
            store.list().await.unwrap(),
            vec!["streamlite-images-v2", "streamlite-static-v2"]
        );
        assert_eq!(worker.phase().await, WorkerPhase::Active);
    }

    #[tokio::test]
    async fn test_navigation_prefers_network_and_never_caches() {
        let (store, fetcher, worker) = build_worker(test_config(&["/index.html"]));
        fetcher.route("/watch/tt001", shell_response("fresh page"));

        let outcome = worker
            .handle_fetch(Request::navigation("/watch/tt001"))
            .await
            .unwrap();
        assert_eq!(outcome.source, ServeSource::Network);
        assert_eq!(outcome.response.body_text(), "fresh page");
        assert!(outcome.revalidation.is_none());

        // Nothing was opened or written on the success path
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_navigation_offline_serves_cached_shell() {
        let (_store, fetcher, worker) = build_worker(test_config(&["/index.html"]));
        fetcher.route("/index.html", shell_response("the shell"));
        worker.install().await.unwrap();

        fetcher.set_offline(true);
        let outcome = worker
            .handle_fetch(Request::navigation("/watch/tt001"))
            .await
            .unwrap();
        assert_eq!(outcome.source, ServeSource::Cache);
        assert_eq!(outcome.response.body_text(), "the shell");
    }

    #[tokio::test]
    async fn test_navigation_offline_synthesizes_placeholder() {
        let (_store, fetcher, worker) = build_worker(test_config(&["/index.html"]));
        fetcher.set_offline(true);

        let outcome = worker
            .handle_fetch(Request::navigation("/"))
            .await
            .unwrap();
        assert_eq!(outcome.source, ServeSource::Fallback);
        assert_eq!(outcome.response.status, 200);
        assert!(outcome
            .response
            .content_type()
            .unwrap_or("")
            .starts_with("text/html"));
        assert!(outcome.response.body_text().contains("Offline"));
    }

    #[tokio::test]
    async fn test_image_miss_falls_through_to_network() {
        let (store, fetcher, worker) = build_worker(test_config(&["/index.html"]));
        fetcher.route("/poster.png", Response::new(200).with_body(b"png-1".to_vec()));

        let outcome = worker
            .handle_fetch(Request::image("/poster.png"))
            .await
            .unwrap();
        assert_eq!(outcome.source, ServeSource::Network);
        assert_eq!(outcome.response.body, b"png-1");
        assert!(outcome.revalidation.is_none());

        let partition = store.open("streamlite-images-v2").await.unwrap();
        assert_eq!(partition.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_image_hit_serves_cached_then_revalidates() {
        let (store, fetcher, worker) = build_worker(test_config(&["/index.html"]));
        fetcher.route("/poster.png", Response::new(200).with_body(b"png-1".to_vec()));

        // Prime the cache, then change what the network returns
        worker
            .handle_fetch(Request::image("/poster.png"))
            .await
            .unwrap();
        fetcher.route("/poster.png", Response::new(200).with_body(b"png-2".to_vec()));

        let outcome = worker
            .handle_fetch(Request::image("/poster.png"))
            .await
            .unwrap();
        assert_eq!(outcome.source, ServeSource::Cache);
        assert_eq!(outcome.response.body, b"png-1");

        // The caller got the stale copy; the refresh lands after the handle
        let handle = outcome.revalidation.expect("hit should revalidate");
        handle.await.unwrap();

        let partition = store.open("streamlite-images-v2").await.unwrap();
        let entry = partition
            .get(&CacheKey::get("/poster.png"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.response.body, b"png-2");
        assert_eq!(fetcher.fetch_count("/poster.png"), 2);
    }

    #[tokio::test]
    async fn test_image_revalidation_failure_keeps_entry() {
        let (store, fetcher, worker) = build_worker(test_config(&["/index.html"]));
        fetcher.route("/poster.png", Response::new(200).with_body(b"png-1".to_vec()));
        worker
            .handle_fetch(Request::image("/poster.png"))
            .await
            .unwrap();

        fetcher.fail_route("/poster.png", "connection reset");
        let outcome = worker
            .handle_fetch(Request::image("/poster.png"))
            .await
            .unwrap();
        assert_eq!(outcome.response.body, b"png-1");

        // The detached task swallows the failure instead of panicking
        outcome.revalidation.expect("hit should revalidate").await.unwrap();

        let partition = store.open("streamlite-images-v2").await.unwrap();
        let entry = partition
            .get(&CacheKey::get("/poster.png"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.response.body, b"png-1");
    }

    #[tokio::test]
    async fn test_image_error_status_returned_but_not_cached() {
        let (store, fetcher, worker) = build_worker(test_config(&["/index.html"]));
        fetcher.route("/poster.png", Response::new(404));

        let outcome = worker
            .handle_fetch(Request::image("/poster.png"))
            .await
            .unwrap();
        assert_eq!(outcome.response.status, 404);
        assert_eq!(outcome.source, ServeSource::Network);

        let partition = store.open("streamlite-images-v2").await.unwrap();
        assert_eq!(partition.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_image_miss_offline_propagates() {
        let (_store, fetcher, worker) = build_worker(test_config(&["/index.html"]));
        fetcher.set_offline(true);

        let err = worker
            .handle_fetch(Request::image("/poster.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::NetworkFailure { .. }));
    }

    #[tokio::test]
    async fn test_cache_first_hit_skips_network() {
        let (_store, fetcher, worker) = build_worker(test_config(&["/app.js"]));
        fetcher.route("/app.js", Response::new(200).with_body(b"js".to_vec()));
        worker.install().await.unwrap();
        assert_eq!(fetcher.fetch_count("/app.js"), 1);

        let outcome = worker.handle_fetch(Request::get("/app.js")).await.unwrap();
        assert_eq!(outcome.source, ServeSource::Cache);
        assert_eq!(outcome.response.body, b"js");
        // Served entirely from cache
        assert_eq!(fetcher.fetch_count("/app.js"), 1);
    }

    #[tokio::test]
    async fn test_cache_first_miss_fetches_and_stores() {
        let (_store, fetcher, worker) = build_worker(test_config(&["/index.html"]));
        fetcher.route("/catalog.json", Response::new(200).with_body(b"[]".to_vec()));

        let first = worker
            .handle_fetch(Request::get("/catalog.json"))
            .await
            .unwrap();
        assert_eq!(first.source, ServeSource::Network);

        let second = worker
            .handle_fetch(Request::get("/catalog.json"))
            .await
            .unwrap();
        assert_eq!(second.source, ServeSource::Cache);
        assert_eq!(second.response.body, b"[]");
        assert_eq!(fetcher.fetch_count("/catalog.json"), 1);
    }

    #[tokio::test]
    async fn test_cache_first_miss_offline_errors() {
        let (_store, fetcher, worker) = build_worker(test_config(&["/index.html"]));
        fetcher.set_offline(true);

        let err = worker
            .handle_fetch(Request::get("/catalog.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::NetworkFailure { .. }));
    }

    #[tokio::test]
    async fn test_cache_first_error_status_not_cached() {
        let (_store, fetcher, worker) = build_worker(test_config(&["/index.html"]));
        fetcher.route("/missing.js", Response::new(404));

        let first = worker.handle_fetch(Request::get("/missing.js")).await.unwrap();
        assert_eq!(first.response.status, 404);
        assert_eq!(first.source, ServeSource::Network);

        // Still a miss, so the network is asked again
        let second = worker.handle_fetch(Request::get("/missing.js")).await.unwrap();
        assert_eq!(second.source, ServeSource::Network);
        assert_eq!(fetcher.fetch_count("/missing.js"), 2);
    }

    #[tokio::test]
    async fn test_dispatch_routes_all_events() {
        let (_store, fetcher, worker) = build_worker(test_config(&["/index.html"]));
        fetcher.route("/index.html", shell_response("shell"));

        let installed = worker.dispatch(LifecycleEvent::Install).await.unwrap();
        assert!(matches!(installed, EventOutcome::Installed(_)));

        let activated = worker.dispatch(LifecycleEvent::Activate).await.unwrap();
        assert!(matches!(activated, EventOutcome::Activated(_)));
        assert_eq!(worker.phase().await, WorkerPhase::Active);

        let served = worker
            .dispatch(LifecycleEvent::Fetch(Request::get("/index.html")))
            .await
            .unwrap();
        match served {
            EventOutcome::Served(outcome) => assert_eq!(outcome.source, ServeSource::Cache),
            other => panic!("expected Served, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_flags_mirror_config() {
        let mut config = test_config(&["/index.html"]);
        config.skip_waiting = false;
        config.claim_clients = false;
        let (_store, fetcher, worker) = build_worker(config);
        fetcher.route("/index.html", shell_response("shell"));

        let report = worker.install().await.unwrap();
        assert!(!report.skip_waiting);
        let report = worker.activate().await.unwrap();
        assert!(!report.clients_claimed);
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(MockFetcher::new());
        let mut config = test_config(&["/index.html"]);
        config.cache_version = 0;

        let result = CacheWorker::new(
            config,
            store as Arc<dyn CacheStore>,
            fetcher as Arc<dyn Fetcher>,
        );
        assert!(matches!(result, Err(WorkerError::InvalidConfig(_))));
    }
}
