use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub initial: InitialTrack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins allowed to call the API from a browser (kiosk UI dev servers).
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

/// Where the local track catalog lives: `<music_dir>/<region>/<era>/*.<ext>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_music_dir")]
    pub music_dir: PathBuf,
    /// Lower-case file extensions treated as playable tracks.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding cover images extracted from embedded tags.
    #[serde(default = "default_cover_cache_dir")]
    pub cover_cache_dir: PathBuf,
    #[serde(default = "default_likes_file")]
    pub likes_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Outbound messages buffered per live client before it is considered dead.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Remote playback provider (Spotify Web API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Token cache written by the OAuth flow: `{"access_token": "..."}`.
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    #[serde(default = "default_likes_playlist")]
    pub likes_playlist: String,
    #[serde(default = "default_search_limit_max")]
    pub search_limit_max: u32,
}

/// Placeholder record shown before the first selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialTrack {
    pub artist: String,
    pub track: String,
    pub region: String,
    pub era: String,
    pub cover_url: String,
    pub track_id: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            music_dir: default_music_dir(),
            extensions: default_extensions(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cover_cache_dir: default_cover_cache_dir(),
            likes_file: default_likes_file(),
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: default_api_base(),
            token_file: default_token_file(),
            likes_playlist: default_likes_playlist(),
            search_limit_max: default_search_limit_max(),
        }
    }
}

impl Default for InitialTrack {
    fn default() -> Self {
        Self {
            artist: "Fela Kuti".to_string(),
            track: "Water No Get Enemy".to_string(),
            region: "Nigeria".to_string(),
            era: "1970s".to_string(),
            cover_url: String::new(),
            track_id: "fela-water-no-get-enemy".to_string(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}

fn default_music_dir() -> PathBuf {
    platform::data_dir().join("music")
}

fn default_extensions() -> Vec<String> {
    vec!["mp3".to_string()]
}

fn default_cover_cache_dir() -> PathBuf {
    platform::data_dir().join("covers")
}

fn default_likes_file() -> PathBuf {
    platform::data_dir().join("likes.json")
}

fn default_queue_capacity() -> usize {
    64
}

fn default_api_base() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_token_file() -> PathBuf {
    platform::data_dir().join("spotify_token.json")
}

fn default_likes_playlist() -> String {
    "Globe likes".to_string()
}

fn default_search_limit_max() -> u32 {
    10
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        // The startup state must carry a usable track id.
        if config.initial.track_id.trim().is_empty() {
            let fallback = InitialTrack::default().track_id;
            warn!("Empty initial.track_id in config, using {:?}", fallback);
            config.initial.track_id = fallback;
        }
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        match std::env::var_os(platform::CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => platform::config_dir().join("config.toml"),
        }
    }
}
