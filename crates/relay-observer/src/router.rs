//! Axum router construction for the Observer API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for cross-origin viewer access.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the Observer server.
///
/// The router includes:
/// - `GET /` -- server status
/// - `POST /games` -- register a match
/// - `GET /games/{id}` -- match metadata
/// - `POST /games/{id}/events` -- append an event
/// - `GET /games/{id}/events` -- `WebSocket` event stream
///
/// Viewers are served from other origins, so CORS allows any origin.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status
        .route("/", get(handlers::index))
        // Match API
        .route("/games", post(handlers::register_game))
        .route("/games/{id}", get(handlers::get_game))
        .route(
            "/games/{id}/events",
            get(ws::game_events).post(handlers::append_event),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
