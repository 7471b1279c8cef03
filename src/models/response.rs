use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::CacheKey;

/// A response as stored and replayed by the worker.
///
/// Bodies are raw bytes; header names are lowercased on insert so lookups
/// are case-insensitive. On disk the body is base64 inside the JSON entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    #[serde(with = "body_encoding")]
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }

    /// Body interpreted as UTF-8, lossy. For logs and tests.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Minimal synthesized page served when a navigation fails offline with
    /// nothing cached. Mirrors the app shell's bare offline notice.
    pub fn offline_placeholder() -> Self {
        Self::new(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body("<h1>Offline</h1>".as_bytes().to_vec())
    }
}

/// Base64 codec for response bodies inside JSON entry files
mod body_encoding {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, body);
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &encoded)
            .map_err(serde::de::Error::custom)
    }
}

/// A stored entry: the response plus its identity and storage time.
///
/// `stored_at` is diagnostic metadata only. Entries never expire on age;
/// they are replaced by revalidation or dropped with their partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub key: CacheKey,
    pub response: Response,
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn new(key: CacheKey, response: Response) -> Self {
        Self {
            key,
            response,
            stored_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.stored_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Negative ages mean clock skew; report them as fresh
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            let remaining_mins = minutes % 60;
            if remaining_mins >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            let remaining_hours = (minutes % 1440) / 60;
            if remaining_hours >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}
