//! `WebSocket` handler for match event streaming.
//!
//! Clients connect to `GET /games/{id}/events` and receive every event of
//! the match as a JSON text frame, starting from the first. The socket is
//! closed with a status code describing how the stream ended:
//!
//! | Code | When |
//! |------|------|
//! | `1000` | Every event was sent |
//! | `1008` | The match is unknown |
//! | `1011` | Store unreachable or archived data unreadable |
//! | `1013` | The client fell behind and was disconnected; reconnect to replay |

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::StreamExt as _;
use relay_core::{RelayError, StreamEnd};
use relay_types::GameId;
use tracing::{debug, warn};

use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` connection and begin
/// streaming the match's events.
///
/// # Route
///
/// `GET /games/{id}/events`
pub async fn game_events(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state, GameId::from(id)))
}

/// Close frame sent when a subscription cannot be opened.
pub fn close_for_error(err: &RelayError) -> CloseFrame {
    let (code, reason) = match err {
        RelayError::UnknownMatch(_) => (close_code::POLICY, "Game not found"),
        RelayError::MalformedRecord { .. } => (close_code::ERROR, "Invalid game data"),
        RelayError::StoreUnavailable(_) => (close_code::ERROR, "Store unavailable"),
        RelayError::AlreadyRegistered(_) | RelayError::ObserverUnreachable(_) => {
            (close_code::ERROR, "Internal error")
        }
    };
    CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    }
}

/// Close frame sent once an event stream has finished.
pub fn close_for_end(end: StreamEnd) -> CloseFrame {
    match end {
        StreamEnd::Completed => CloseFrame {
            code: close_code::NORMAL,
            reason: Utf8Bytes::from_static("Game complete"),
        },
        StreamEnd::Lagged => CloseFrame {
            code: close_code::AGAIN,
            reason: Utf8Bytes::from_static("Observer fell behind"),
        },
    }
}

/// Handle the `WebSocket` lifecycle: subscribe to the match and forward
/// each event as a text frame until the stream or the client ends.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, id: GameId) {
    let mut stream = match state.registry.subscribe(&id).await {
        Ok(stream) => stream,
        Err(e) => {
            debug!(game_id = %id, error = %e, "Subscription refused");
            close(&mut socket, close_for_error(&e)).await;
            return;
        }
    };

    debug!(
        game_id = %id,
        source = ?stream.source(),
        observer_id = ?stream.observer_id(),
        "WebSocket client connected"
    );

    loop {
        tokio::select! {
            // Next event for this observer.
            next = stream.next() => {
                let Some(event) = next else {
                    debug!(game_id = %id, end = ?stream.end(), "Event stream finished");
                    close(&mut socket, close_for_end(stream.end())).await;
                    return;
                };
                let json = match serde_json::to_string(&event) {
                    Ok(j) => j,
                    Err(e) => {
                        warn!(game_id = %id, "Failed to serialize game event: {e}");
                        continue;
                    }
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    debug!(game_id = %id, "WebSocket client disconnected (send failed)");
                    return;
                }
            }
            // Check if the client sent a close frame or disconnected.
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(game_id = %id, "WebSocket client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!(game_id = %id, "WebSocket client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(game_id = %id, "WebSocket error: {e}");
                        return;
                    }
                    _ => {
                        // Spectators have nothing to say.
                    }
                }
            }
        }
    }
}

async fn close(socket: &mut WebSocket, frame: CloseFrame) {
    if socket.send(Message::Close(Some(frame))).await.is_err() {
        debug!("WebSocket client gone before close frame");
    }
}
