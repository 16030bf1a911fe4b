mod catalog;
mod core;
mod cover_cache;
mod error;
mod files;
mod http;
mod hub;
mod live;
mod metadata;
mod remote;

use std::sync::Arc;

use globe_proto::config::Config;
use globe_proto::likes::{JsonLikesStore, LikesStore};
use globe_proto::protocol::{PlaybackState, Source};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::catalog::Catalog;
use crate::core::{RadioCore, Selector};
use crate::cover_cache::CoverCache;
use crate::files::FileRoots;
use crate::hub::Hub;
use crate::metadata::{LoftyTagReader, Resolver};
use crate::remote::{RemoteProvider, SpotifyProvider, UnavailableProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = globe_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // File writer + stderr
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,globe_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    std::fs::create_dir_all(&config.catalog.music_dir)?;
    std::fs::create_dir_all(&config.paths.cover_cache_dir)?;
    info!("Music directory: {:?}", config.catalog.music_dir);

    let likes: Arc<dyn LikesStore> = Arc::new(JsonLikesStore::open(&config.paths.likes_file));

    let catalog = Catalog::new(&config.catalog.music_dir, &config.catalog.extensions);
    let resolver = Resolver::new(
        Box::new(LoftyTagReader),
        CoverCache::new(&config.paths.cover_cache_dir),
    );
    let selector = Arc::new(Selector::new(catalog, resolver));

    let initial = PlaybackState {
        artist: config.initial.artist.clone(),
        track: config.initial.track.clone(),
        region: config.initial.region.clone(),
        era: config.initial.era.clone(),
        cover_url: config.initial.cover_url.clone(),
        track_id: config.initial.track_id.clone(),
        source: Source::Local,
        ..Default::default()
    };
    let hub = Arc::new(Hub::new(initial, likes.clone(), config.live.queue_capacity));

    let remote: Arc<dyn RemoteProvider> = if config.remote.enabled {
        match SpotifyProvider::new(&config.remote) {
            Ok(provider) => {
                info!("Remote playback enabled via {}", config.remote.api_base);
                Arc::new(provider)
            }
            Err(e) => {
                warn!("Remote provider unavailable: {:#}", e);
                Arc::new(UnavailableProvider)
            }
        }
    } else {
        Arc::new(UnavailableProvider)
    };

    let core = Arc::new(RadioCore::new(selector, hub, likes, remote));

    let state = http::AppState {
        core,
        files: Arc::new(FileRoots {
            music_dir: config.catalog.music_dir.clone(),
            cover_cache_dir: config.paths.cover_cache_dir.clone(),
        }),
        search_limit_max: config.remote.search_limit_max,
    };
    let app = http::router(state, &config.http.cors_origins);

    let http_handle = http::start_server(config.http.bind_address.clone(), config.http.port, app);

    info!("Daemon initialised");
    http_handle.await?;

    Ok(())
}
