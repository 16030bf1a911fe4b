//! On-disk cache of cover images pulled out of embedded tags.
//!
//! Entries are keyed by the track file stem only: `<stem>.jpg`, `<stem>.png`
//! or `<stem>.img`. Two tracks sharing a stem in different region/era buckets
//! share one slot, and a changed embedded image is not picked up until the
//! cached file is removed by hand.

use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::catalog::CatalogEntry;
use crate::metadata::EmbeddedTag;

/// Extensions a cached cover may carry, in lookup order.
const CACHE_EXTENSIONS: [&str; 3] = ["jpg", "png", "img"];

#[derive(Debug)]
pub struct CoverCache {
    dir: PathBuf,
    /// Held across lookup and write so one stem never ends up with two
    /// files of different extensions.
    write_lock: Mutex<()>,
}

impl CoverCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// File name of the cached cover for `stem`, if one exists.
    pub fn lookup(&self, stem: &str) -> Option<String> {
        CACHE_EXTENSIONS
            .iter()
            .map(|ext| format!("{}.{}", stem, ext))
            .find(|name| self.dir.join(name).is_file())
    }

    /// Makes sure the first embedded picture of `tag` is cached for `entry`.
    ///
    /// Returns true when a cover is available afterwards, whether it was
    /// already cached or has just been written. An existing entry is never
    /// rewritten.
    pub fn ensure_cached(&self, entry: &CatalogEntry, tag: &EmbeddedTag) -> bool {
        let Some(picture) = tag.picture.as_ref() else {
            return false;
        };

        let stem = entry.stem();
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = self.lookup(&stem) {
            debug!("Cover for {:?} already cached as {}", stem, existing);
            return true;
        }

        let name = format!("{}.{}", stem, extension_for_mime(picture.mime_type.as_deref()));
        match self.write(&name, &picture.data) {
            Ok(()) => {
                debug!("Cached embedded cover {}", name);
                true
            }
            Err(e) => {
                warn!("Failed to cache cover {}: {}", name, e);
                false
            }
        }
    }

    fn write(&self, name: &str, data: &[u8]) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        // Readers must never see a half-written image.
        let tmp = self.dir.join(format!(".{}.part", name));
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, self.dir.join(name))
    }
}

/// Cache file extension for a declared picture MIME type.
pub fn extension_for_mime(mime: Option<&str>) -> &'static str {
    let Some(mime) = mime else {
        return "jpg";
    };
    let mime = mime.to_ascii_lowercase();
    if mime.is_empty() || mime.contains("jpeg") || mime.contains("jpg") {
        "jpg"
    } else if mime.contains("png") {
        "png"
    } else {
        "img"
    }
}
