//! The radio core: turns triggers (selection, next, patch, remote playback,
//! likes) into state mutations.
//!
//! File system work happens before the hub lock is taken; only the final
//! field writes and the broadcast run under it.

use std::sync::Arc;

use globe_proto::likes::LikesStore;
use globe_proto::protocol::{
    LikeRequest, LikeResponse, PlaybackState, RemoteTrack, Source, StatePatch,
};
use tracing::{error, info, warn};

use crate::catalog::{Catalog, CatalogEntry};
use crate::hub::Hub;
use crate::metadata::{ResolvedMetadata, Resolver, PLACEHOLDER_ARTIST};
use crate::remote::{PlayOutcome, ProviderError, RemoteProvider};

pub const NO_TRACK_ID: &str = "no-track";
pub const NO_TRACK_TITLE: &str = "No track";

/// Outcome of picking and resolving a track, ready to be written into state.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Track {
        entry: CatalogEntry,
        meta: ResolvedMetadata,
    },
    Empty {
        region: String,
        era: String,
    },
}

impl Selection {
    /// Overwrites every track field of `state`.
    pub fn apply_to(&self, state: &mut PlaybackState) {
        state.source = Source::Local;
        match self {
            Selection::Track { entry, meta } => {
                state.region = entry.region.clone();
                state.era = entry.era.clone();
                state.artist = meta.artist.clone();
                state.track = meta.title.clone();
                state.cover_url = meta.cover_url.clone();
                state.track_id = entry.track_id();
                state.stream_url = entry.stream_url();
            }
            Selection::Empty { region, era } => {
                state.region = region.clone();
                state.era = era.clone();
                state.artist = PLACEHOLDER_ARTIST.to_string();
                state.track = NO_TRACK_TITLE.to_string();
                state.cover_url.clear();
                state.track_id = NO_TRACK_ID.to_string();
                state.stream_url.clear();
            }
        }
    }
}

/// Catalog scan + metadata resolution. Blocking; run off the async runtime.
pub struct Selector {
    catalog: Catalog,
    resolver: Resolver,
}

impl Selector {
    pub fn new(catalog: Catalog, resolver: Resolver) -> Self {
        Self { catalog, resolver }
    }

    pub fn select(&self, region: &str, era: &str) -> Selection {
        match self.catalog.select_track(region, era) {
            Some(entry) => {
                let meta = self.resolver.resolve(&entry);
                Selection::Track { entry, meta }
            }
            None => Selection::Empty {
                region: region.to_string(),
                era: era.to_string(),
            },
        }
    }
}

pub struct RadioCore {
    selector: Arc<Selector>,
    hub: Arc<Hub>,
    likes: Arc<dyn LikesStore>,
    remote: Arc<dyn RemoteProvider>,
}

impl RadioCore {
    pub fn new(
        selector: Arc<Selector>,
        hub: Arc<Hub>,
        likes: Arc<dyn LikesStore>,
        remote: Arc<dyn RemoteProvider>,
    ) -> Self {
        Self {
            selector,
            hub,
            likes,
            remote,
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn remote(&self) -> &dyn RemoteProvider {
        self.remote.as_ref()
    }

    pub async fn state(&self) -> PlaybackState {
        self.hub.snapshot().await
    }

    async fn resolve(&self, region: &str, era: &str) -> Selection {
        let selector = self.selector.clone();
        let (r, e) = (region.to_string(), era.to_string());
        match tokio::task::spawn_blocking(move || selector.select(&r, &e)).await {
            Ok(selection) => selection,
            Err(err) => {
                error!("Track resolution task failed: {}", err);
                Selection::Empty {
                    region: region.to_string(),
                    era: era.to_string(),
                }
            }
        }
    }

    /// Picks a new local track for `region`/`era` and broadcasts it.
    pub async fn apply_selection(&self, region: &str, era: &str) -> PlaybackState {
        let selection = self.resolve(region, era).await;
        if matches!(selection, Selection::Empty { .. }) {
            info!("No tracks for {}/{}", region, era);
        }
        let state = self.hub.update(|state| selection.apply_to(state)).await;
        info!("Now playing {:?} ({})", state.track, state.track_id);
        state
    }

    /// Re-rolls the current region/era.
    pub async fn next_track(&self) -> PlaybackState {
        let current = self.hub.snapshot().await;
        self.apply_selection(&current.region, &current.era).await
    }

    /// Merges the provided fields. A patch that names a region or era also
    /// triggers a fresh selection, which wins over patched display fields.
    pub async fn apply_manual_patch(&self, patch: StatePatch) -> PlaybackState {
        if !patch.changes_selection() {
            return self.hub.update(|state| patch.apply_to(state)).await;
        }

        let current = self.hub.snapshot().await;
        let region = patch.region.clone().unwrap_or(current.region);
        let era = patch.era.clone().unwrap_or(current.era);
        let selection = self.resolve(&region, &era).await;

        self.hub
            .update(|state| {
                patch.apply_to(state);
                selection.apply_to(state);
            })
            .await
    }

    /// Switches the state over to a track played by the remote provider.
    pub async fn apply_remote_track_event(&self, track: &RemoteTrack) -> PlaybackState {
        let track_id = format!("{}-{}", self.remote.name(), track.id);
        self.hub
            .update(|state| {
                state.artist = track.artist.clone();
                state.track = track.name.clone();
                state.cover_url = track.image.clone();
                state.track_id = track_id;
                state.source = Source::Remote;
                state.stream_url.clear();
            })
            .await
    }

    /// Starts remote playback; state only changes once the track is known.
    pub async fn play_remote(
        &self,
        uri: &str,
        device_id: Option<&str>,
    ) -> Result<(PlayOutcome, PlaybackState), ProviderError> {
        let outcome = self.remote.play(uri, device_id).await?;
        let state = match &outcome.track {
            Some(track) => self.apply_remote_track_event(track).await,
            None => self.hub.snapshot().await,
        };
        Ok((outcome, state))
    }

    /// Records a like. The current state is re-broadcast only when the like
    /// concerns the track playing right now.
    pub async fn set_like(&self, req: &LikeRequest) -> anyhow::Result<LikeResponse> {
        let likes = self.likes.clone();
        let (track_id, liked) = (req.track_id.clone(), req.liked);
        tokio::task::spawn_blocking(move || likes.set_liked(&track_id, liked)).await??;

        self.hub
            .update_if(|state| state.track_id == req.track_id)
            .await;

        let mut remote_added = false;
        if let (true, Some(uri)) = (req.liked, req.track_uri.as_deref()) {
            match self.remote.add_to_likes(uri).await {
                Ok(()) => remote_added = true,
                Err(e) => warn!("Could not add {} to remote likes: {}", uri, e),
            }
        }

        Ok(LikeResponse {
            ok: true,
            remote_added,
        })
    }
}
