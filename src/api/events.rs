// `/events`: the one protected-feeling endpoint that sits outside
// `auth::auth_middleware` (a browser's `WebSocket` constructor cannot set an
// `Authorization` header), so it authenticates itself via a query-string
// token or a bearer-carrying subprotocol instead (spec §6).

use super::{error::ApiError, AppState};
use crate::constants::EVENT_STREAM_QUERY_TOKEN_KEY;
use crate::error::EngineError;
use crate::pipeline::events::EngineEvent;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::header;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use tokio::sync::broadcast;

pub async fn events_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if !token_presented(&params, &headers, &state.token) {
        return ApiError::from(EngineError::AuthInvalid).into_response();
    }

    let rx = state.events().subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, rx))
}

fn token_presented(params: &HashMap<String, String>, headers: &HeaderMap, expected: &str) -> bool {
    if let Some(token) = params.get(EVENT_STREAM_QUERY_TOKEN_KEY) {
        if constant_time_eq(token.as_bytes(), expected.as_bytes()) {
            return true;
        }
    }
    headers
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(|proto| constant_time_eq(proto.as_bytes(), expected.as_bytes()))
        .unwrap_or(false)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Forward every published event to the socket as a JSON text frame until
/// the client disconnects or falls far enough behind that the broadcast
/// channel drops messages out from under it.
async fn handle_socket(mut socket: WebSocket, mut rx: broadcast::Receiver<EngineEvent>) {
    loop {
        tokio::select! {
            received = rx.recv() => {
                match received {
                    Ok(event) => {
                        let Ok(text) = serde_json::to_string(&event) else { continue };
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    None | Some(Ok(Message::Close(_))) => break,
                    Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
