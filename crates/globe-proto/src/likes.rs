//! Persisted track-id → liked map.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::warn;

/// Key → boolean store the daemon consults whenever it exposes state.
pub trait LikesStore: Send + Sync {
    fn is_liked(&self, track_id: &str) -> bool;

    /// Last write wins. Persists before returning.
    fn set_liked(&self, track_id: &str, liked: bool) -> anyhow::Result<()>;
}

/// JSON file store: `{"<trackId>": true, ...}`.
pub struct JsonLikesStore {
    path: PathBuf,
    likes: RwLock<BTreeMap<String, bool>>,
}

impl JsonLikesStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let likes = Self::load(&path);
        Self {
            path,
            likes: RwLock::new(likes),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> BTreeMap<String, bool> {
        let Ok(content) = std::fs::read_to_string(path) else {
            return BTreeMap::new();
        };
        match serde_json::from_str(&content) {
            Ok(likes) => likes,
            Err(e) => {
                warn!("Ignoring unreadable likes file {:?}: {}", path, e);
                BTreeMap::new()
            }
        }
    }

    fn save(&self, likes: &BTreeMap<String, bool>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(likes)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl LikesStore for JsonLikesStore {
    fn is_liked(&self, track_id: &str) -> bool {
        let likes = self.likes.read().unwrap_or_else(|e| e.into_inner());
        likes.get(track_id).copied().unwrap_or(false)
    }

    fn set_liked(&self, track_id: &str, liked: bool) -> anyhow::Result<()> {
        let mut likes = self.likes.write().unwrap_or_else(|e| e.into_inner());
        likes.insert(track_id.to_string(), liked);
        self.save(&likes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_track_is_not_liked() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLikesStore::open(dir.path().join("likes.json"));
        assert!(!store.is_liked("nope"));
    }

    #[test]
    fn test_like_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("likes.json");

        let store = JsonLikesStore::open(&path);
        store.set_liked("x", true).unwrap();
        store.set_liked("y", true).unwrap();
        store.set_liked("y", false).unwrap();
        assert!(store.is_liked("x"));
        assert!(!store.is_liked("y"));

        let reopened = JsonLikesStore::open(&path);
        assert!(reopened.is_liked("x"));
        assert!(!reopened.is_liked("y"));
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("likes.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = JsonLikesStore::open(&path);
        assert!(!store.is_liked("x"));
        store.set_liked("x", true).unwrap();
        assert!(JsonLikesStore::open(&path).is_liked("x"));
    }
}
