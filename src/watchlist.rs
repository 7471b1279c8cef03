//! Persisted watch-list membership.
//!
//! The UI renders catalog items and filters on this set; the worker side
//! only owns membership and its durable copy. A missing or unreadable file
//! loads as the empty set so a damaged list never blocks the app.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::warn;

use crate::error::{WorkerError, WorkerResult};

#[derive(Debug)]
pub struct WatchList {
    path: PathBuf,
    ids: BTreeSet<String>,
}

impl WatchList {
    /// Load the list from `path`. Missing or corrupt files yield an empty
    /// list; only the path is remembered for later saves.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ids = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Vec<String>>(&contents) {
                Ok(ids) => ids.into_iter().collect(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupt watch list, starting empty");
                    BTreeSet::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable watch list, starting empty");
                BTreeSet::new()
            }
        };
        Self { path, ids }
    }

    pub fn save(&self) -> WorkerResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| WorkerError::storage(format!("creating {}", parent.display()), e))?;
        }
        let ids: Vec<&String> = self.ids.iter().collect();
        let contents = serde_json::to_string_pretty(&ids)?;
        std::fs::write(&self.path, contents)
            .map_err(|e| WorkerError::storage(format!("writing {}", self.path.display()), e))?;
        Ok(())
    }

    /// Flip membership of `id`. Returns whether the id is in the list
    /// afterwards.
    pub fn toggle(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.ids.remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Ids in stable (sorted) order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let list = WatchList::load(dir.path().join("watchlist.json"));
        assert!(list.is_empty());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("watchlist.json");
        std::fs::write(&path, b"{not valid").unwrap();

        let list = WatchList::load(&path);
        assert!(list.is_empty());
    }

    #[test]
    fn test_toggle_flips_membership() {
        let dir = TempDir::new().unwrap();
        let mut list = WatchList::load(dir.path().join("watchlist.json"));

        assert!(list.toggle("tt001"));
        assert!(list.contains("tt001"));
        assert!(!list.toggle("tt001"));
        assert!(!list.contains("tt001"));
    }

    #[test]
    fn test_roundtrips_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("watchlist.json");

        let mut list = WatchList::load(&path);
        list.toggle("tt002");
        list.toggle("tt001");
        list.save().unwrap();

        let loaded = WatchList::load(&path);
        assert_eq!(loaded.len(), 2);
        let ids: Vec<&str> = loaded.ids().collect();
        assert_eq!(ids, vec!["tt001", "tt002"]);
    }
}
