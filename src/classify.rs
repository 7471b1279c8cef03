//! Request classification.
//!
//! Every intercepted request maps to exactly one `RequestKind`, and the kind
//! alone selects the caching strategy. Classification is a pure function of
//! the request's mode and destination so it can be tested in isolation.

use crate::models::{Destination, Request, RequestMode};

/// Which caching strategy a request gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Top-level navigation: network-first with offline fallback
    Navigation,
    /// Image subresource: stale-while-revalidate
    Image,
    /// Everything else: cache-first
    Static,
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestKind::Navigation => write!(f, "navigation"),
            RequestKind::Image => write!(f, "image"),
            RequestKind::Static => write!(f, "static"),
        }
    }
}

/// Classify a request. Navigation mode wins over destination: a navigation
/// to an image URL is still a navigation.
pub fn classify(request: &Request) -> RequestKind {
    if request.mode == RequestMode::Navigate {
        return RequestKind::Navigation;
    }
    if request.destination == Destination::Image {
        return RequestKind::Image;
    }
    RequestKind::Static
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Method, Request};

    #[test]
    fn test_classify_navigation() {
        assert_eq!(classify(&Request::navigation("/")), RequestKind::Navigation);
        assert_eq!(
            classify(&Request::navigation("/watch/tt001")),
            RequestKind::Navigation
        );
    }

    #[test]
    fn test_classify_image() {
        assert_eq!(
            classify(&Request::image("/icons/icon-192.png")),
            RequestKind::Image
        );
    }

    #[test]
    fn test_classify_static_default() {
        assert_eq!(classify(&Request::get("/app.js")), RequestKind::Static);
        assert_eq!(classify(&Request::get("/manifest.json")), RequestKind::Static);
        assert_eq!(
            classify(&Request::get("/styles.css").with_destination(Destination::Style)),
            RequestKind::Static
        );
    }

    #[test]
    fn test_navigation_wins_over_destination() {
        let req = Request {
            method: Method::Get,
            url: "/poster.png".to_string(),
            mode: RequestMode::Navigate,
            destination: Destination::Image,
        };
        assert_eq!(classify(&req), RequestKind::Navigation);
    }

    #[test]
    fn test_image_url_with_other_destination_is_static() {
        // Destination drives classification, not the URL extension
        let req = Request::get("/poster.png");
        assert_eq!(classify(&req), RequestKind::Static);
    }
}
