use serde::{Deserialize, Serialize};

/// HTTP method of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the page issued the request. Navigations (address bar, link clicks)
/// carry `Navigate`; subresource requests carry the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    Cors,
    NoCors,
}

/// What kind of resource the request is for, as reported by the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    Other,
}

/// An intercepted resource request.
///
/// URLs may be absolute or origin-relative paths; relative ones are resolved
/// against the configured origin at fetch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub mode: RequestMode,
    pub destination: Destination,
}

impl Request {
    /// A top-level navigation (address bar, link click)
    pub fn navigation(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            mode: RequestMode::Navigate,
            destination: Destination::Document,
        }
    }

    /// An image subresource request
    pub fn image(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            mode: RequestMode::NoCors,
            destination: Destination::Image,
        }
    }

    /// A plain GET subresource request (scripts, styles, data)
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            mode: RequestMode::NoCors,
            destination: Destination::Other,
        }
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            method: self.method,
            url: self.url.clone(),
        }
    }
}

/// Identity of a stored entry: method plus URL.
///
/// Header-sensitive matching (Vary) is left to the platform; partitions
/// match on method and URL only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub method: Method,
    pub url: String,
}

impl CacheKey {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
