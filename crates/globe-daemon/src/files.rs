//! Byte serving for catalog audio, sidecar covers and cached covers.
//!
//! Every request path is canonicalised and must stay under its root; any
//! miss, including an escape attempt, is a plain `NotFound`.

use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::Response;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::ApiError;

/// Roots the byte-serving endpoints may read from.
#[derive(Debug, Clone)]
pub struct FileRoots {
    pub music_dir: PathBuf,
    pub cover_cache_dir: PathBuf,
}

/// Resolves `<root>/<segments..>/<file_name>` and returns it only if the
/// canonical result is an existing file inside the canonical root.
pub async fn resolve_within(root: &Path, segments: &[&str], file_name: &str) -> Option<PathBuf> {
    let name = Path::new(file_name).file_name()?;

    let mut candidate = root.to_path_buf();
    for segment in segments {
        candidate.push(segment);
    }
    candidate.push(name);

    let root = tokio::fs::canonicalize(root).await.ok()?;
    let resolved = tokio::fs::canonicalize(&candidate).await.ok()?;
    if !resolved.starts_with(&root) {
        debug!("Refusing path outside served root: {:?}", candidate);
        return None;
    }

    let meta = tokio::fs::metadata(&resolved).await.ok()?;
    meta.is_file().then_some(resolved)
}

pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" | "opus" => "audio/ogg",
        "m4a" | "mp4" | "aac" => "audio/mp4",
        "wav" => "audio/wav",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Streams the file at `path` (already resolved) as the response body.
pub async fn serve_file(path: &Path) -> Result<Response, ApiError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|_| ApiError::NotFound)?;
    let len = file.metadata().await.ok().map(|m| m.len());

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type_for(path));
    if let Some(len) = len {
        builder = builder.header(CONTENT_LENGTH, len);
    }

    builder
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ApiError::Internal(e.into()))
}

pub async fn serve_within(
    root: &Path,
    segments: &[&str],
    file_name: &str,
) -> Result<Response, ApiError> {
    let path = resolve_within(root, segments, file_name)
        .await
        .ok_or(ApiError::NotFound)?;
    serve_file(&path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn layout() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("music/Nigeria/1970s")).unwrap();
        fs::write(dir.path().join("music/Nigeria/1970s/zombie.mp3"), b"audio").unwrap();
        fs::create_dir_all(dir.path().join("outside")).unwrap();
        fs::write(dir.path().join("outside/secret.mp3"), b"secret").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_resolves_existing_file() {
        let dir = layout();
        let root = dir.path().join("music");
        let found = resolve_within(&root, &["Nigeria", "1970s"], "zombie.mp3").await;
        assert!(found.unwrap().ends_with("zombie.mp3"));
    }

    #[tokio::test]
    async fn test_missing_file_is_none() {
        let dir = layout();
        let root = dir.path().join("music");
        assert!(resolve_within(&root, &["Nigeria", "1970s"], "nope.mp3").await.is_none());
        assert!(resolve_within(&root, &["Nigeria", "1970s"], "").await.is_none());
    }

    #[tokio::test]
    async fn test_escape_attempts_are_rejected() {
        let dir = layout();
        let root = dir.path().join("music");
        assert!(resolve_within(&root, &["..", "outside"], "secret.mp3").await.is_none());
        assert!(resolve_within(&root, &["Nigeria", "1970s"], "../../../outside/secret.mp3")
            .await
            .is_none());
        assert!(resolve_within(&root, &["Nigeria", "1970s"], "../../etc/passwd")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_directories_are_not_served() {
        let dir = layout();
        let root = dir.path().join("music");
        assert!(resolve_within(&root, &["Nigeria"], "1970s").await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_out_of_root_is_rejected() {
        let dir = layout();
        let root = dir.path().join("music");
        std::os::unix::fs::symlink(
            dir.path().join("outside/secret.mp3"),
            root.join("Nigeria/1970s/link.mp3"),
        )
        .unwrap();
        assert!(resolve_within(&root, &["Nigeria", "1970s"], "link.mp3").await.is_none());
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("a.mp3")), "audio/mpeg");
        assert_eq!(content_type_for(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("a.png")), "image/png");
        assert_eq!(content_type_for(Path::new("a.img")), "application/octet-stream");
    }
}
