use serde::{Deserialize, Serialize};

/// Where the current track is played from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Local,
    Remote,
}

/// The single "now playing" record shared by every display/control client.
///
/// `liked` is never authoritative on the record itself: the daemon recomputes
/// it from the likes store each time the state is handed to a consumer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    /// Monotonic revision counter — incremented on every state change.
    #[serde(default)]
    pub rev: u64,
    pub artist: String,
    pub track: String,
    pub region: String,
    pub era: String,
    pub cover_url: String,
    pub track_id: String,
    pub source: Source,
    pub stream_url: String,
    #[serde(default)]
    pub liked: bool,
}

/// Partial update of the display fields. Absent fields are left untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StatePatch {
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub era: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub track_id: Option<String>,
    #[serde(default)]
    pub stream_url: Option<String>,
}

impl StatePatch {
    /// True when applying this patch must be followed by a fresh catalog pick.
    pub fn changes_selection(&self) -> bool {
        self.region.is_some() || self.era.is_some()
    }

    pub fn apply_to(&self, state: &mut PlaybackState) {
        fn merge(slot: &mut String, value: &Option<String>) {
            if let Some(v) = value {
                slot.clone_from(v);
            }
        }

        merge(&mut state.artist, &self.artist);
        merge(&mut state.track, &self.track);
        merge(&mut state.region, &self.region);
        merge(&mut state.era, &self.era);
        merge(&mut state.cover_url, &self.cover_url);
        // A track always keeps a usable identity.
        if self.track_id.as_deref().is_some_and(|id| !id.is_empty()) {
            merge(&mut state.track_id, &self.track_id);
        }
        merge(&mut state.stream_url, &self.stream_url);
    }
}

/// Messages pushed from the daemon to live clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LiveMessage {
    State { state: PlaybackState },
}

impl LiveMessage {
    pub fn encode(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Track descriptor handed over by a remote playback provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTrack {
    pub id: String,
    pub uri: String,
    pub name: String,
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub preview_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDevice {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStatus {
    pub available: bool,
    pub authenticated: bool,
}

// ── Request / response bodies ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectRequest {
    pub region: String,
    pub era: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeRequest {
    pub track_id: String,
    pub liked: bool,
    #[serde(default)]
    pub track_uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub ok: bool,
    pub remote_added: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchResponse {
    pub ok: bool,
    pub state: PlaybackState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub tracks: Vec<RemoteTrack>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayRequest {
    pub uri: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayResponse {
    pub ok: bool,
    pub device_id: String,
    pub state: PlaybackState,
}
