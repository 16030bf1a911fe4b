//! Local track catalog laid out as `<root>/<region>/<era>/<track>.<ext>`.

use std::path::{Component, Path, PathBuf};

use rand::seq::SliceRandom;
use tracing::debug;

/// One playable file picked from the catalog. Not retained between requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub region: String,
    pub era: String,
    pub path: PathBuf,
}

impl CatalogEntry {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Identity of this track across the whole catalog. The same file name in
    /// two region/era buckets yields two distinct ids.
    pub fn track_id(&self) -> String {
        format!("{}-{}-{}", self.region, self.era, self.stem())
    }

    pub fn stream_url(&self) -> String {
        api_path("/api/audio", &[&self.region, &self.era, &self.file_name()])
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
    extensions: Vec<String>,
}

impl Catalog {
    pub fn new(root: impl Into<PathBuf>, extensions: &[String]) -> Self {
        Self {
            root: root.into(),
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
        }
    }

    /// Playable files directly inside `<root>/<region>/<era>`, sorted by name.
    /// A missing directory is an empty bucket, not an error.
    pub fn list(&self, region: &str, era: &str) -> Vec<PathBuf> {
        if !is_plain_segment(region) || !is_plain_segment(era) {
            debug!("Rejecting catalog bucket {:?}/{:?}", region, era);
            return Vec::new();
        }

        let dir = self.root.join(region).join(era);
        let Ok(read_dir) = std::fs::read_dir(&dir) else {
            debug!("No catalog directory at {:?}", dir);
            return Vec::new();
        };

        let mut tracks: Vec<PathBuf> = read_dir
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && self.is_track(path))
            .collect();
        tracks.sort();
        tracks
    }

    /// Picks one track uniformly at random from the bucket.
    pub fn select_track(&self, region: &str, era: &str) -> Option<CatalogEntry> {
        let tracks = self.list(region, era);
        let path = tracks.choose(&mut rand::thread_rng())?.clone();
        Some(CatalogEntry {
            region: region.to_string(),
            era: era.to_string(),
            path,
        })
    }

    fn is_track(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

/// Joins `segments` under `prefix`, percent-encoding each one so names with
/// `#`, `?` or `%` survive the trip back through the router.
pub fn api_path(prefix: &str, segments: &[&str]) -> String {
    let mut path = prefix.to_string();
    for segment in segments {
        path.push('/');
        path.push_str(&urlencoding::encode(segment));
    }
    path
}

/// True for a single ordinary path component (no separators, no `..`).
pub fn is_plain_segment(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
