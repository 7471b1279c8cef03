//! Request and response models.
//!
//! These mirror the platform's fetch types closely enough for the worker to
//! classify and route requests:
//!
//! - `Request`, `Method`, `RequestMode`, `Destination`: intercepted requests
//! - `CacheKey`: method + URL identity of a stored entry
//! - `Response`, `CachedResponse`: stored/replayed responses with timestamps

pub mod request;
pub mod response;

pub use request::{CacheKey, Destination, Method, Request, RequestMode};
pub use response::{CachedResponse, Response};
