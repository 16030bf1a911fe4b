//! Remote playback provider (streaming service) behind a capability trait.
//!
//! The OAuth dance lives outside the daemon; the Spotify provider only reads
//! the access token the login flow leaves in its token cache file.

use std::path::PathBuf;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use globe_proto::config::RemoteConfig;
use globe_proto::protocol::{RemoteDevice, RemoteStatus, RemoteTrack};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("remote playback is not available")]
    NotAvailable,
    #[error("not authenticated with the remote provider")]
    NotAuthenticated,
    #[error("no remote playback device available")]
    NoDevice,
    #[error("remote request failed: {0}")]
    RequestFailed(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::RequestFailed(e.to_string())
    }
}

/// Result of starting playback on a remote device.
#[derive(Debug, Clone)]
pub struct PlayOutcome {
    pub device_id: String,
    /// Descriptor of the started track; `None` when the lookup failed after
    /// playback had already started.
    pub track: Option<RemoteTrack>,
}

pub trait RemoteProvider: Send + Sync {
    /// Namespace used for track ids of this provider's tracks.
    fn name(&self) -> &str;

    fn status(&self) -> BoxFuture<'_, RemoteStatus>;

    fn search<'a>(
        &'a self,
        query: &'a str,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<RemoteTrack>, ProviderError>>;

    fn devices(&self) -> BoxFuture<'_, Result<Vec<RemoteDevice>, ProviderError>>;

    fn play<'a>(
        &'a self,
        uri: &'a str,
        device_id: Option<&'a str>,
    ) -> BoxFuture<'a, Result<PlayOutcome, ProviderError>>;

    /// Adds the track to the provider-side likes playlist.
    fn add_to_likes<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<(), ProviderError>>;
}

/// Stand-in used when no provider is configured.
pub struct UnavailableProvider;

impl RemoteProvider for UnavailableProvider {
    fn name(&self) -> &str {
        "remote"
    }

    fn status(&self) -> BoxFuture<'_, RemoteStatus> {
        async { RemoteStatus::default() }.boxed()
    }

    fn search<'a>(
        &'a self,
        _query: &'a str,
        _limit: u32,
    ) -> BoxFuture<'a, Result<Vec<RemoteTrack>, ProviderError>> {
        async { Err(ProviderError::NotAvailable) }.boxed()
    }

    fn devices(&self) -> BoxFuture<'_, Result<Vec<RemoteDevice>, ProviderError>> {
        async { Err(ProviderError::NotAvailable) }.boxed()
    }

    fn play<'a>(
        &'a self,
        _uri: &'a str,
        _device_id: Option<&'a str>,
    ) -> BoxFuture<'a, Result<PlayOutcome, ProviderError>> {
        async { Err(ProviderError::NotAvailable) }.boxed()
    }

    fn add_to_likes<'a>(&'a self, _uri: &'a str) -> BoxFuture<'a, Result<(), ProviderError>> {
        async { Err(ProviderError::NotAvailable) }.boxed()
    }
}

// ── Spotify Web API ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TokenCache {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    tracks: Paging<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    id: String,
    uri: String,
    name: String,
    #[serde(default)]
    artists: Vec<ApiNamed>,
    #[serde(default)]
    album: Option<ApiAlbum>,
    #[serde(default)]
    duration_ms: u64,
    #[serde(default)]
    preview_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiNamed {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiAlbum {
    #[serde(default)]
    name: String,
    #[serde(default)]
    images: Vec<ApiImage>,
}

#[derive(Debug, Deserialize)]
struct ApiImage {
    url: String,
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    #[serde(default)]
    devices: Vec<ApiDevice>,
}

#[derive(Debug, Deserialize)]
struct ApiDevice {
    id: Option<String>,
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    is_active: bool,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiPlaylist {
    id: String,
    #[serde(default)]
    name: String,
}

impl From<ApiTrack> for RemoteTrack {
    fn from(t: ApiTrack) -> Self {
        let (album, image) = match t.album {
            Some(album) => {
                let image = album.images.into_iter().next().map(|i| i.url).unwrap_or_default();
                (album.name, image)
            }
            None => (String::new(), String::new()),
        };
        RemoteTrack {
            id: t.id,
            uri: t.uri,
            name: t.name,
            artist: t
                .artists
                .into_iter()
                .map(|a| a.name)
                .collect::<Vec<_>>()
                .join(", "),
            album,
            image,
            duration_ms: t.duration_ms,
            preview_url: t.preview_url.unwrap_or_default(),
        }
    }
}

pub struct SpotifyProvider {
    client: Client,
    api_base: String,
    token_file: PathBuf,
    likes_playlist: String,
}

impl SpotifyProvider {
    pub fn new(config: &RemoteConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token_file: config.token_file.clone(),
            likes_playlist: config.likes_playlist.clone(),
        })
    }

    /// Token is re-read on every call so a fresh login is picked up.
    async fn token(&self) -> Result<String, ProviderError> {
        let content = tokio::fs::read_to_string(&self.token_file)
            .await
            .map_err(|_| ProviderError::NotAuthenticated)?;
        let cache: TokenCache =
            serde_json::from_str(&content).map_err(|_| ProviderError::NotAuthenticated)?;
        cache
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(ProviderError::NotAuthenticated)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        let token = self.token().await?;
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::NotAuthenticated);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Spotify API returned {}: {}", status, body);
            return Err(ProviderError::RequestFailed(format!("{}: {}", status, body)));
        }
        Ok(response)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ProviderError> {
        Ok(self.send(request).await?.json::<T>().await?)
    }

    async fn fetch_devices(&self) -> Result<Vec<RemoteDevice>, ProviderError> {
        let list: DeviceList = self
            .get_json(self.client.get(self.url("/me/player/devices")))
            .await?;
        Ok(list
            .devices
            .into_iter()
            .filter_map(|d| {
                Some(RemoteDevice {
                    id: d.id?,
                    name: d.name,
                    kind: d.kind,
                    is_active: d.is_active,
                })
            })
            .collect())
    }

    async fn fetch_track(&self, uri: &str) -> Result<RemoteTrack, ProviderError> {
        let id = uri.rsplit(':').next().unwrap_or(uri);
        let track: ApiTrack = self
            .get_json(self.client.get(self.url(&format!("/tracks/{}", id))))
            .await?;
        Ok(track.into())
    }

    async fn start_playback(&self, uri: &str, device_id: Option<&str>) -> Result<PlayOutcome, ProviderError> {
        let device_id = match device_id {
            Some(id) => id.to_string(),
            None => {
                let devices = self.fetch_devices().await?;
                devices
                    .into_iter()
                    .next()
                    .map(|d| d.id)
                    .ok_or(ProviderError::NoDevice)?
            }
        };

        self.send(
            self.client
                .put(self.url("/me/player/play"))
                .query(&[("device_id", device_id.as_str())])
                .json(&json!({ "uris": [uri] })),
        )
        .await?;
        info!("Remote playback of {} started on device {}", uri, device_id);

        let track = match self.fetch_track(uri).await {
            Ok(track) => Some(track),
            Err(e) => {
                warn!("Playback started but track lookup for {} failed: {}", uri, e);
                None
            }
        };
        Ok(PlayOutcome { device_id, track })
    }

    async fn find_or_create_likes_playlist(&self) -> Result<String, ProviderError> {
        let wanted = self.likes_playlist.trim().to_lowercase();
        let mut page: Paging<ApiPlaylist> = self
            .get_json(
                self.client
                    .get(self.url("/me/playlists"))
                    .query(&[("limit", "50")]),
            )
            .await?;

        loop {
            if let Some(found) = page
                .items
                .iter()
                .find(|p| p.name.trim().to_lowercase() == wanted)
            {
                return Ok(found.id.clone());
            }
            match page.next.take() {
                Some(next) => page = self.get_json(self.client.get(next)).await?,
                None => break,
            }
        }

        let user: ApiUser = self.get_json(self.client.get(self.url("/me"))).await?;
        let created: ApiPlaylist = self
            .get_json(
                self.client
                    .post(self.url(&format!("/users/{}/playlists", user.id)))
                    .json(&json!({
                        "name": self.likes_playlist,
                        "public": false,
                        "description": "Tracks liked in Globe Radio",
                    })),
            )
            .await?;
        info!("Created remote likes playlist {}", created.id);
        Ok(created.id)
    }
}

impl RemoteProvider for SpotifyProvider {
    fn name(&self) -> &str {
        "spotify"
    }

    fn status(&self) -> BoxFuture<'_, RemoteStatus> {
        async move {
            RemoteStatus {
                available: true,
                authenticated: self.token().await.is_ok(),
            }
        }
        .boxed()
    }

    fn search<'a>(
        &'a self,
        query: &'a str,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<RemoteTrack>, ProviderError>> {
        async move {
            debug!("Spotify search {:?} (limit {})", query, limit);
            let limit = limit.to_string();
            let result: SearchResult = self
                .get_json(self.client.get(self.url("/search")).query(&[
                    ("q", query),
                    ("type", "track"),
                    ("limit", limit.as_str()),
                ]))
                .await?;
            Ok(result.tracks.items.into_iter().map(RemoteTrack::from).collect())
        }
        .boxed()
    }

    fn devices(&self) -> BoxFuture<'_, Result<Vec<RemoteDevice>, ProviderError>> {
        self.fetch_devices().boxed()
    }

    fn play<'a>(
        &'a self,
        uri: &'a str,
        device_id: Option<&'a str>,
    ) -> BoxFuture<'a, Result<PlayOutcome, ProviderError>> {
        self.start_playback(uri, device_id).boxed()
    }

    fn add_to_likes<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<(), ProviderError>> {
        async move {
            let playlist_id = self.find_or_create_likes_playlist().await?;
            self.send(
                self.client
                    .post(self.url(&format!("/playlists/{}/tracks", playlist_id)))
                    .json(&json!({ "uris": [uri] })),
            )
            .await?;
            Ok(())
        }
        .boxed()
    }
}
