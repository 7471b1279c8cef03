//! Configuration for the worker and the CLI host.
//!
//! `WorkerConfig` is everything the cache manager needs: partition naming,
//! the precache manifest, and activation behavior. `AppConfig` wraps it for
//! the binary and is stored at `~/.config/shellcache/config.json`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{WorkerError, WorkerResult};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "shellcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Watch list file name
const WATCHLIST_FILE: &str = "watchlist.json";

/// Worker configuration, explicit per instance.
///
/// The generation number must be bumped whenever the precache manifest
/// changes, so stale partitions can be recognized and collected on
/// activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Prefix for partition names, e.g. "streamlite" -> "streamlite-static-v2"
    pub cache_prefix: String,
    /// Generation number shared by both current partitions
    pub cache_version: u32,
    /// URLs precached at install; all must succeed or install fails
    pub precache: Vec<String>,
    /// Document served when a navigation fails offline
    pub navigation_fallback: String,
    /// Activate immediately after install instead of waiting for old clients
    pub skip_waiting: bool,
    /// Apply the activated worker to already-open pages
    pub claim_clients: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_prefix: "streamlite".to_string(),
            cache_version: 2,
            precache: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/app.js".to_string(),
                "/manifest.json".to_string(),
                "/icons/icon-192.png".to_string(),
                "/icons/icon-512.png".to_string(),
            ],
            navigation_fallback: "/index.html".to_string(),
            skip_waiting: true,
            claim_clients: true,
        }
    }
}

impl WorkerConfig {
    /// Name of the current static partition
    pub fn static_partition(&self) -> String {
        format!("{}-static-v{}", self.cache_prefix, self.cache_version)
    }

    /// Name of the current images partition
    pub fn image_partition(&self) -> String {
        format!("{}-images-v{}", self.cache_prefix, self.cache_version)
    }

    /// The partition names activation keeps; everything else is collected
    pub fn current_partitions(&self) -> Vec<String> {
        vec![self.static_partition(), self.image_partition()]
    }

    pub fn validate(&self) -> WorkerResult<()> {
        let prefix_ok = !self.cache_prefix.is_empty()
            && self
                .cache_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
        if !prefix_ok {
            return Err(WorkerError::InvalidConfig(format!(
                "cache_prefix '{}' must be non-empty [A-Za-z0-9_-]",
                self.cache_prefix
            )));
        }
        if self.cache_version == 0 {
            return Err(WorkerError::InvalidConfig(
                "cache_version must be at least 1".to_string(),
            ));
        }
        if self.precache.is_empty() {
            return Err(WorkerError::InvalidConfig(
                "precache manifest must not be empty".to_string(),
            ));
        }
        if self.precache.iter().any(|url| url.is_empty()) {
            return Err(WorkerError::InvalidConfig(
                "precache manifest contains an empty URL".to_string(),
            ));
        }
        if self.navigation_fallback.is_empty() {
            return Err(WorkerError::InvalidConfig(
                "navigation_fallback must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the CLI host: which origin to fetch from plus the
/// worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub origin: String,
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:8080".to_string(),
            worker: WorkerConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> WorkerResult<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| WorkerError::storage(format!("reading {}", path.display()), e))?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> WorkerResult<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| WorkerError::storage(format!("creating {}", parent.display()), e))?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .map_err(|e| WorkerError::storage(format!("writing {}", path.display()), e))?;
        Ok(())
    }

    pub fn config_path() -> WorkerResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| WorkerError::Internal("Could not find config directory".to_string()))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn watchlist_path() -> WorkerResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| WorkerError::Internal("Could not find config directory".to_string()))?;
        Ok(config_dir.join(APP_NAME).join(WATCHLIST_FILE))
    }

    /// Cache root for this origin. Scoped by a slug of the origin so two
    /// origins never share partitions.
    pub fn cache_dir(&self) -> WorkerResult<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| WorkerError::Internal("Could not find cache directory".to_string()))?;
        Ok(cache_dir.join(APP_NAME).join(origin_slug(&self.origin)))
    }
}

/// Reduce an origin URL to a directory-safe slug, e.g.
/// "http://127.0.0.1:8080" -> "127.0.0.1-8080"
fn origin_slug(origin: &str) -> String {
    let trimmed = origin
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    let slug: String = trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if slug.is_empty() {
        "default".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_partition_names() {
        let config = WorkerConfig::default();
        assert_eq!(config.static_partition(), "streamlite-static-v2");
        assert_eq!(config.image_partition(), "streamlite-images-v2");
        assert_eq!(
            config.current_partitions(),
            vec!["streamlite-static-v2", "streamlite-images-v2"]
        );
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(WorkerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_prefix() {
        let mut config = WorkerConfig::default();
        config.cache_prefix = "has space".to_string();
        assert!(config.validate().is_err());

        config.cache_prefix = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_manifest() {
        let mut config = WorkerConfig::default();
        config.precache.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_version_zero() {
        let mut config = WorkerConfig::default();
        config.cache_version = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_origin_slug() {
        assert_eq!(origin_slug("http://127.0.0.1:8080"), "127.0.0.1-8080");
        assert_eq!(origin_slug("https://streamlite.example.com/"), "streamlite.example.com");
        assert_eq!(origin_slug(""), "default");
    }

    #[test]
    fn test_config_roundtrips_json() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.origin, config.origin);
        assert_eq!(back.worker.cache_version, config.worker.cache_version);
    }
}
