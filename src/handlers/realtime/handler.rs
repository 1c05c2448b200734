//! Realtime WebSocket handler

use axum::{
    extract::{State, ws::WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
};
use std::sync::Arc;
use tracing::info;

use crate::core::relay::upstream::CLIENT_REQUEST_ID_HEADER;
use crate::state::AppState;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Realtime WebSocket handler
///
/// Upgrades the connection and hands it to the relay, which opens the matching
/// upstream session. An `x-ms-client-request-id` header on the upgrade request
/// is forwarded to the upstream handshake.
pub async fn realtime_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let client_request_id = headers
        .get(CLIENT_REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    info!(
        client_request_id = client_request_id.as_deref().unwrap_or_default(),
        "Realtime WebSocket connection upgrade requested"
    );

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| async move {
            state.relay.handle_client(socket, client_request_id).await;
        })
}
