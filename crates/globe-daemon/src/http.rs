use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderValue, Method};
use axum::response::{Json, Response};
use axum::routing::{get, post};
use axum::Router;
use globe_proto::protocol::{
    LikeRequest, LikeResponse, PatchResponse, PlayRequest, PlayResponse, PlaybackState,
    RemoteDevice, RemoteStatus, SearchRequest, SearchResponse, SelectRequest, StatePatch,
};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};

use crate::core::RadioCore;
use crate::error::ApiError;
use crate::files::{self, FileRoots};
use crate::live;

#[derive(Clone)]
pub struct AppState {
    pub core: Arc<RadioCore>,
    pub files: Arc<FileRoots>,
    pub search_limit_max: u32,
}

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/select", post(select))
        .route("/api/next", post(next_track))
        .route("/api/patch", post(patch))
        .route("/api/like", post(like))
        .route("/api/audio/:region/:era/:filename", get(audio))
        .route("/api/cover/:region/:era/:filename", get(cover))
        .route("/api/cover-cache/:filename", get(cover_cache))
        .route("/api/live", get(live::live_socket))
        .route("/api/remote/status", get(remote_status))
        .route("/api/remote/search", post(remote_search))
        .route("/api/remote/devices", get(remote_devices))
        .route("/api/remote/play", post(remote_play))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", o);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

pub fn start_server(bind_address: String, port: u16, app: Router) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_state(State(state): State<AppState>) -> Json<PlaybackState> {
    Json(state.core.state().await)
}

async fn select(
    State(state): State<AppState>,
    Json(req): Json<SelectRequest>,
) -> Json<PlaybackState> {
    info!("HTTP API: Select {}/{}", req.region, req.era);
    Json(state.core.apply_selection(&req.region, &req.era).await)
}

async fn next_track(State(state): State<AppState>) -> Json<PlaybackState> {
    info!("HTTP API: Next track");
    Json(state.core.next_track().await)
}

async fn patch(
    State(state): State<AppState>,
    Json(patch): Json<StatePatch>,
) -> Json<PatchResponse> {
    info!("HTTP API: Patch {:?}", patch);
    let new_state = state.core.apply_manual_patch(patch).await;
    Json(PatchResponse {
        ok: true,
        state: new_state,
    })
}

async fn like(
    State(state): State<AppState>,
    Json(req): Json<LikeRequest>,
) -> Result<Json<LikeResponse>, ApiError> {
    if req.track_id.is_empty() {
        return Err(ApiError::BadRequest("trackId must not be empty".into()));
    }
    info!("HTTP API: Like {} = {}", req.track_id, req.liked);
    Ok(Json(state.core.set_like(&req).await?))
}

async fn audio(
    State(state): State<AppState>,
    Path((region, era, filename)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    files::serve_within(&state.files.music_dir, &[&region, &era], &filename).await
}

async fn cover(
    State(state): State<AppState>,
    Path((region, era, filename)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    files::serve_within(&state.files.music_dir, &[&region, &era], &filename).await
}

async fn cover_cache(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    files::serve_within(&state.files.cover_cache_dir, &[], &filename).await
}

async fn remote_status(State(state): State<AppState>) -> Json<RemoteStatus> {
    Json(state.core.remote().status().await)
}

async fn remote_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let max = state.search_limit_max.max(1);
    let limit = req.limit.unwrap_or(max).clamp(1, max);
    let tracks = state.core.remote().search(&req.query, limit).await?;
    info!("HTTP API: Remote search {:?} -> {} tracks", req.query, tracks.len());
    Ok(Json(SearchResponse { tracks }))
}

async fn remote_devices(State(state): State<AppState>) -> Result<Json<Vec<RemoteDevice>>, ApiError> {
    Ok(Json(state.core.remote().devices().await?))
}

async fn remote_play(
    State(state): State<AppState>,
    Json(req): Json<PlayRequest>,
) -> Result<Json<PlayResponse>, ApiError> {
    info!("HTTP API: Remote play {}", req.uri);
    let (outcome, new_state) = state
        .core
        .play_remote(&req.uri, req.device_id.as_deref())
        .await?;
    Ok(Json(PlayResponse {
        ok: true,
        device_id: outcome.device_id,
        state: new_state,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tests::{radio, radio_with, TestRadio};
    use crate::remote::{PlayOutcome, ProviderError, RemoteProvider};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use globe_proto::protocol::RemoteTrack;
    use std::sync::Mutex;
    use tower::ServiceExt;

    fn app(radio: &TestRadio) -> Router {
        let state = AppState {
            core: radio.core.clone(),
            files: Arc::new(FileRoots {
                music_dir: radio.music_dir(),
                cover_cache_dir: radio.cover_dir(),
            }),
            search_limit_max: 10,
        };
        router(state, &["http://localhost:5173".to_string()])
    }

    async fn call(app: Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, Vec<u8>) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                req = req.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn json(bytes: &[u8]) -> serde_json::Value {
        serde_json::from_slice(bytes).unwrap()
    }

    /// Provider that records search limits and plays a fixed track.
    #[derive(Default)]
    struct FakeProvider {
        limits: Mutex<Vec<u32>>,
    }

    impl RemoteProvider for FakeProvider {
        fn name(&self) -> &str {
            "spotify"
        }

        fn status(&self) -> BoxFuture<'_, RemoteStatus> {
            async {
                RemoteStatus {
                    available: true,
                    authenticated: true,
                }
            }
            .boxed()
        }

        fn search<'a>(
            &'a self,
            _query: &'a str,
            limit: u32,
        ) -> BoxFuture<'a, Result<Vec<RemoteTrack>, ProviderError>> {
            self.limits.lock().unwrap().push(limit);
            async { Ok(Vec::new()) }.boxed()
        }

        fn devices(&self) -> BoxFuture<'_, Result<Vec<RemoteDevice>, ProviderError>> {
            async { Err(ProviderError::NotAuthenticated) }.boxed()
        }

        fn play<'a>(
            &'a self,
            uri: &'a str,
            _device_id: Option<&'a str>,
        ) -> BoxFuture<'a, Result<PlayOutcome, ProviderError>> {
            async move {
                Ok(PlayOutcome {
                    device_id: "kiosk".into(),
                    track: Some(RemoteTrack {
                        id: "abc".into(),
                        uri: uri.to_string(),
                        name: "Lady".into(),
                        artist: "Fela Kuti".into(),
                        ..Default::default()
                    }),
                })
            }
            .boxed()
        }

        fn add_to_likes<'a>(&'a self, _uri: &'a str) -> BoxFuture<'a, Result<(), ProviderError>> {
            async { Ok(()) }.boxed()
        }
    }

    #[tokio::test]
    async fn test_get_state() {
        let radio = radio();
        let (status, body) = call(app(&radio), "GET", "/api/state", None).await;
        assert_eq!(status, StatusCode::OK);
        let state = json(&body);
        assert_eq!(state["trackId"], "fela-water-no-get-enemy");
        assert_eq!(state["liked"], false);
    }

    #[tokio::test]
    async fn test_select_then_stream_audio() {
        let radio = radio();
        radio.add_track("Japan/1980s/plastic-love.mp3", None);

        let (status, body) = call(
            app(&radio),
            "POST",
            "/api/select",
            Some(serde_json::json!({"region": "Japan", "era": "1980s"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let state = json(&body);
        assert_eq!(state["trackId"], "Japan-1980s-plastic-love");

        let stream_url = state["streamUrl"].as_str().unwrap().to_string();
        let (status, body) = call(app(&radio), "GET", &stream_url, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"not audio");
    }

    #[tokio::test]
    async fn test_stream_url_with_reserved_characters_is_served() {
        for name in ["Side A #1.mp3", "Who?.mp3", "100% Funk.mp3"] {
            let radio = radio();
            radio.add_track(&format!("Japan/1980s/{}", name), None);

            let (_, body) = call(
                app(&radio),
                "POST",
                "/api/select",
                Some(serde_json::json!({"region": "Japan", "era": "1980s"})),
            )
            .await;
            let stream_url = json(&body)["streamUrl"].as_str().unwrap().to_string();

            let (status, body) = call(app(&radio), "GET", &stream_url, None).await;
            assert_eq!(status, StatusCode::OK, "{}", stream_url);
            assert_eq!(body, b"not audio");
        }
    }

    #[tokio::test]
    async fn test_patch_endpoint() {
        let radio = radio();
        let (status, body) = call(
            app(&radio),
            "POST",
            "/api/patch",
            Some(serde_json::json!({"artist": "New"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let resp = json(&body);
        assert_eq!(resp["ok"], true);
        assert_eq!(resp["state"]["artist"], "New");
        assert_eq!(resp["state"]["track"], "Water No Get Enemy");
    }

    #[tokio::test]
    async fn test_like_endpoint() {
        let radio = radio();
        let (status, body) = call(
            app(&radio),
            "POST",
            "/api/like",
            Some(serde_json::json!({"trackId": "fela-water-no-get-enemy", "liked": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["remoteAdded"], false);

        let (_, body) = call(app(&radio), "GET", "/api/state", None).await;
        assert_eq!(json(&body)["liked"], true);
    }

    #[tokio::test]
    async fn test_traversal_is_not_found() {
        let radio = radio();
        radio.add_track("Nigeria/1970s/zombie.mp3", None);
        std::fs::create_dir_all(radio.dir.path().join("outside")).unwrap();
        std::fs::write(radio.dir.path().join("outside/secret.mp3"), b"secret").unwrap();

        for uri in [
            "/api/audio/Nigeria/1970s/..%2F..%2F..%2Fetc%2Fpasswd",
            "/api/audio/%2E%2E/outside/secret.mp3",
            "/api/cover/Nigeria/1970s/..%2F..%2F..%2Foutside%2Fsecret.mp3",
            "/api/cover-cache/..%2Fmusic%2FNigeria%2F1970s%2Fzombie.mp3",
        ] {
            let (status, body) = call(app(&radio), "GET", uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
            assert_eq!(json(&body)["error"], "file_not_found");
        }
    }

    #[tokio::test]
    async fn test_cover_cache_is_served() {
        let radio = radio();
        std::fs::create_dir_all(radio.cover_dir()).unwrap();
        std::fs::write(radio.cover_dir().join("zombie.png"), b"png").unwrap();

        let resp = app(&radio)
            .oneshot(
                Request::builder()
                    .uri("/api/cover-cache/zombie.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "image/png");
    }

    #[tokio::test]
    async fn test_remote_unavailable() {
        let radio = radio();
        let (status, _) = call(
            app(&radio),
            "POST",
            "/api/remote/play",
            Some(serde_json::json!({"uri": "spotify:track:abc"})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, body) = call(app(&radio), "GET", "/api/remote/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["available"], false);
    }

    #[tokio::test]
    async fn test_remote_search_clamps_limit() {
        let provider = Arc::new(FakeProvider::default());
        let radio = radio_with(provider.clone());
        for limit in [serde_json::json!(50), serde_json::json!(0), serde_json::Value::Null] {
            let (status, _) = call(
                app(&radio),
                "POST",
                "/api/remote/search",
                Some(serde_json::json!({"query": "fela", "limit": limit})),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }
        assert_eq!(*provider.limits.lock().unwrap(), vec![10, 1, 10]);
    }

    #[tokio::test]
    async fn test_remote_play_updates_state() {
        let radio = radio_with(Arc::new(FakeProvider::default()));
        let (status, body) = call(
            app(&radio),
            "POST",
            "/api/remote/play",
            Some(serde_json::json!({"uri": "spotify:track:abc"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let resp = json(&body);
        assert_eq!(resp["deviceId"], "kiosk");
        assert_eq!(resp["state"]["trackId"], "spotify-abc");
        assert_eq!(resp["state"]["source"], "remote");

        let (status, _) = call(app(&radio), "GET", "/api/remote/devices", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_like_with_uri_reaches_provider() {
        let radio = radio_with(Arc::new(FakeProvider::default()));
        let (status, body) = call(
            app(&radio),
            "POST",
            "/api/like",
            Some(serde_json::json!({"trackId": "spotify-abc", "liked": true, "trackUri": "spotify:track:abc"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["remoteAdded"], true);
    }
}
