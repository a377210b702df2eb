use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use tokio::time::MissedTickBehavior;

use super::AppState;

// ═══════════════════════════════════════════════════════════════
//  WebSocket: /ws
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_ws(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(socket, state))
}

/// Push snapshot'а каждые `ws_interval`. Тот же JSON, что и `GET /data`.
/// Пустой store не отправляется. При shutdown соединение закрывается
/// Close frame'ом.
async fn ws_connection(mut socket: WebSocket, state: AppState) {
    let mut ticker = tokio::time::interval(state.ws_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::debug!("ws client connected");

    loop {
        tokio::select! {
            biased;

            _ = state.shutdown.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Inbound frames carry no meaning here.
                    Some(Ok(_)) => continue,
                }
            }

            _ = ticker.tick() => {
                let snapshot = state.store.snapshot().await;
                if snapshot.is_empty() {
                    continue;
                }
                let json = match serde_json::to_string(&snapshot) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!(error = %e, "snapshot serialization failed");
                        continue;
                    }
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!("ws client disconnected");
}
