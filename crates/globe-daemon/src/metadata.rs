//! Track metadata resolution.
//!
//! Each field is resolved on its own from, in order:
//! 1. the JSON sidecar next to the track (`<stem>.json`),
//! 2. the tag embedded in the audio container (read lazily),
//! 3. the file name (`title`) or a placeholder (`artist`).
//!
//! The cover follows its own chain: sidecar image, then the cover cache.
//! Nothing here fails; every broken source just falls through.

use std::path::Path;

use lofty::prelude::*;
use lofty::probe::Probe;
use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::{api_path, CatalogEntry};
use crate::cover_cache::CoverCache;

pub const PLACEHOLDER_ARTIST: &str = "—";

/// Externally authored `<stem>.json` next to a track.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sidecar {
    pub artist: Option<String>,
    pub title: Option<String>,
    /// Image file name relative to the track's directory.
    pub cover: Option<String>,
}

impl Sidecar {
    fn is_complete(&self) -> bool {
        self.artist.is_some() && self.title.is_some() && self.cover.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedPicture {
    pub data: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Metadata stored inside the audio container itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddedTag {
    pub artist: Option<String>,
    pub title: Option<String>,
    /// First picture found in the tag.
    pub picture: Option<EmbeddedPicture>,
}

/// Reads embedded tags. `None` means no usable tag data, for whatever reason.
pub trait TagReader: Send + Sync {
    fn read_tag(&self, path: &Path) -> Option<EmbeddedTag>;
}

/// Tag reader backed by lofty (ID3v2, Vorbis comments, MP4 ilst, ...).
pub struct LoftyTagReader;

impl TagReader for LoftyTagReader {
    fn read_tag(&self, path: &Path) -> Option<EmbeddedTag> {
        let tagged_file = match Probe::open(path).and_then(|probe| probe.read()) {
            Ok(f) => f,
            Err(e) => {
                warn!("Unreadable tags in {:?}: {}", path, e);
                return None;
            }
        };

        let tag = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())?;

        let picture = tag.pictures().first().map(|p| EmbeddedPicture {
            data: p.data().to_vec(),
            mime_type: p.mime_type().map(|m| m.as_str().to_string()),
        });

        Some(EmbeddedTag {
            artist: tag.artist().and_then(|s| non_empty(&s)),
            title: tag.title().and_then(|s| non_empty(&s)),
            picture,
        })
    }
}

/// Normalised metadata for the track about to be played.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMetadata {
    pub artist: String,
    pub title: String,
    /// URL path of the cover, empty when there is none.
    pub cover_url: String,
}

pub struct Resolver {
    tags: Box<dyn TagReader>,
    covers: CoverCache,
}

impl Resolver {
    pub fn new(tags: Box<dyn TagReader>, covers: CoverCache) -> Self {
        Self { tags, covers }
    }

    pub fn resolve(&self, entry: &CatalogEntry) -> ResolvedMetadata {
        let sidecar = read_sidecar(&entry.path).unwrap_or_default();

        let embedded = if sidecar.is_complete() {
            None
        } else {
            let tag = self.tags.read_tag(&entry.path);
            if let Some(tag) = &tag {
                self.covers.ensure_cached(entry, tag);
            }
            tag
        };
        let embedded = embedded.unwrap_or_default();

        let artist = sidecar
            .artist
            .or(embedded.artist)
            .unwrap_or_else(|| PLACEHOLDER_ARTIST.to_string());
        let title = sidecar.title.or(embedded.title).unwrap_or_else(|| entry.stem());

        let cover_url = sidecar
            .cover
            .map(|cover| api_path("/api/cover", &[&entry.region, &entry.era, &cover]))
            .or_else(|| {
                self.covers
                    .lookup(&entry.stem())
                    .map(|name| api_path("/api/cover-cache", &[&name]))
            })
            .unwrap_or_default();

        debug!(
            "Resolved {:?}: artist={:?} title={:?} cover={:?}",
            entry.path, artist, title, cover_url
        );

        ResolvedMetadata {
            artist,
            title,
            cover_url,
        }
    }
}

/// Reads the sidecar for `track`. Missing or malformed files yield `None`;
/// fields that are absent, empty or not strings are dropped individually.
pub fn read_sidecar(track: &Path) -> Option<Sidecar> {
    let path = track.with_extension("json");
    let content = std::fs::read_to_string(&path).ok()?;

    let value: Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Malformed sidecar {:?}: {}", path, e);
            return None;
        }
    };
    let Value::Object(fields) = value else {
        warn!("Sidecar {:?} is not a JSON object", path);
        return None;
    };

    let field = |key: &str| fields.get(key).and_then(Value::as_str).and_then(non_empty);
    Some(Sidecar {
        artist: field("artist"),
        title: field("title"),
        cover: field("cover").and_then(|c| {
            // Only a bare file name next to the track is honoured.
            let name = Path::new(&c).file_name()?.to_str()?.to_string();
            Some(name)
        }),
    })
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
