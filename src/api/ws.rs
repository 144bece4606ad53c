use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::api::AppState;

/// `GET /ws`: stream broadcaster snapshots until either side goes away.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut subscription = state.broadcaster.subscribe();
    let id = subscription.id;
    debug!(id, "WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            update = subscription.recv() => {
                let Some(snapshot) = update else { break };
                match serde_json::to_string(&snapshot) {
                    Ok(json) => {
                        if sender.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(id, error = %e, "Failed to serialize snapshot"),
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(id, error = %e, "WebSocket error");
                    break;
                }
                // clients have nothing to say; ignore text, pings and pongs
                Some(Ok(_)) => {}
            }
        }
    }

    state.broadcaster.unsubscribe(id);
    debug!(id, "WebSocket client disconnected");
}
