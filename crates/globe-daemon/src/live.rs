use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use crate::http::AppState;
use crate::hub::Hub;

pub async fn live_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let hub = state.core.hub().clone();
    ws.on_upgrade(move |socket| handle_client(socket, hub))
}

/// One live display/control client. Inbound frames are only keepalives; the
/// outbound side drains this client's hub queue, starting with the snapshot
/// queued at subscription.
async fn handle_client(socket: WebSocket, hub: Arc<Hub>) {
    let mut subscription = hub.subscribe().await;
    let client_id = subscription.id;
    info!(
        "Live client {} connected ({} live)",
        client_id,
        hub.subscriber_count().await
    );

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Live client {} closed connection", client_id);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Read error from live client {}: {}", client_id, e);
                        break;
                    }
                }
            }

            outbound = subscription.rx.recv() => {
                let Some(msg) = outbound else {
                    info!("Live client {} dropped by hub", client_id);
                    break;
                };
                let text = match msg.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode live message: {}", e);
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    }

    hub.unsubscribe(client_id).await;
    info!("Live client {} disconnected", client_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tests::radio;
    use crate::files::FileRoots;
    use crate::http;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    async fn next_state<S>(ws: &mut S) -> serde_json::Value
    where
        S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for a live frame")
                .unwrap()
                .unwrap();
            if let WsMessage::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_live_client_gets_snapshot_then_updates() {
        let radio = radio();
        radio.add_track("Japan/1980s/plastic-love.mp3", None);
        let hub = radio.core.hub().clone();

        let app = http::router(
            AppState {
                core: radio.core.clone(),
                files: Arc::new(FileRoots {
                    music_dir: radio.music_dir(),
                    cover_cache_dir: radio.cover_dir(),
                }),
                search_limit_max: 10,
            },
            &[],
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/api/live", addr))
            .await
            .unwrap();

        let first = next_state(&mut ws).await;
        assert_eq!(first["type"], "state");
        assert_eq!(first["state"]["trackId"], "fela-water-no-get-enemy");

        // Keepalive frames from the client are ignored.
        ws.send(WsMessage::Text("ping".into())).await.unwrap();

        let resp = reqwest::Client::new()
            .post(format!("http://{}/api/select", addr))
            .json(&serde_json::json!({"region": "Japan", "era": "1980s"}))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());

        let second = next_state(&mut ws).await;
        assert_eq!(second["type"], "state");
        assert_eq!(second["state"]["trackId"], "Japan-1980s-plastic-love");
        assert!(second["state"]["rev"].as_u64() > first["state"]["rev"].as_u64());
        assert_eq!(hub.subscriber_count().await, 1);

        ws.close(None).await.unwrap();
        for _ in 0..100 {
            if hub.subscriber_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(hub.subscriber_count().await, 0);
    }
}
