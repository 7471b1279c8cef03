//! HTTP fetcher backed by reqwest.
//!
//! Resolves origin-relative request URLs against a configured base origin
//! and maps transport errors into the worker's error taxonomy.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::{WorkerError, WorkerResult};
use crate::models::{Method, Request, Response};

use super::Fetcher;

/// HTTP request timeout in seconds.
/// 30s allows for slow origins while still reporting transport failure fast
/// enough for the navigation fallback to feel responsive.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Fetcher backed by a real HTTP client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    origin: String,
}

impl HttpFetcher {
    /// Create a fetcher resolving relative URLs against `origin`
    pub fn new(origin: impl Into<String>) -> WorkerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| WorkerError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            origin: origin.into(),
        })
    }

    /// Resolve a request URL to an absolute one. Absolute URLs pass through;
    /// path-only URLs are joined to the origin.
    fn absolute_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.origin.trim_end_matches('/'), url.trim_start_matches('/'))
        }
    }

    fn reqwest_method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Patch => reqwest::Method::PATCH,
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> WorkerResult<Response> {
        let url = self.absolute_url(&request.url);
        debug!(method = %request.method, url = %url, "Fetching");

        let result = self
            .client
            .request(Self::reqwest_method(request.method), &url)
            .send()
            .await
            .map_err(|e| WorkerError::network(&request.url, e.to_string()))?;

        let status = result.status().as_u16();

        let mut headers = BTreeMap::new();
        for (name, value) in result.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
            }
        }

        let body = result
            .bytes()
            .await
            .map_err(|e| WorkerError::network(&request.url, e.to_string()))?;

        Ok(Response {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}
