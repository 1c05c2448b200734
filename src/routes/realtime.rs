//! Realtime WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::realtime_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the realtime relay router
///
/// # Endpoint
///
/// `GET /realtime` - WebSocket upgrade. Frames are relayed to the upstream
/// realtime service after server-side session configuration is applied.
pub fn create_realtime_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/realtime", get(realtime_handler))
        .layer(TraceLayer::new_for_http())
}
