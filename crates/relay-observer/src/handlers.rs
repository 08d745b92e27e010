//! REST API endpoint handlers for the Observer server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Server status and registry counts |
//! | `POST` | `/games` | Register a match |
//! | `GET` | `/games/{id}` | Match metadata |
//! | `POST` | `/games/{id}/events` | Append an event to a live match |

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use relay_core::AppendOutcome;
use relay_types::{Game, GameEvent, GameId};

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

/// Body of `GET /`.
#[derive(Debug, serde::Serialize)]
pub struct StatusResponse {
    /// Always `Ok` while the server answers.
    pub status: &'static str,
    /// Matches still accepting events.
    pub live_games: usize,
    /// Ended matches whose archive is not yet written.
    pub pending_archives: usize,
    /// Matches held in memory.
    pub resident_games: usize,
    /// Observers attached across all matches.
    pub observers: usize,
    /// Server start time.
    pub started_at: DateTime<Utc>,
}

/// Envelope for a single match descriptor.
#[derive(Debug, serde::Serialize)]
pub struct GameResponse {
    /// The match.
    #[serde(rename = "Game")]
    pub game: Game,
}

// ---------------------------------------------------------------------------
// GET /
// ---------------------------------------------------------------------------

/// Report server status.
pub async fn index(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let stats = state.registry.stats();
    Json(StatusResponse {
        status: "Ok",
        live_games: stats.live,
        pending_archives: stats.pending_archives,
        resident_games: stats.resident,
        observers: stats.observers,
        started_at: state.started_at,
    })
}

// ---------------------------------------------------------------------------
// POST /games
// ---------------------------------------------------------------------------

/// Register a new match.
///
/// Returns `201` with the registered descriptor, `409` if the match is
/// already resident, `400` if the body is not a valid descriptor.
pub async fn register_game(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Game>, JsonRejection>,
) -> Result<impl IntoResponse, ObserverError> {
    let Json(game) = payload?;
    let game = state.registry.register(game)?;
    Ok((StatusCode::CREATED, Json(GameResponse { game })))
}

// ---------------------------------------------------------------------------
// GET /games/{id}
// ---------------------------------------------------------------------------

/// Fetch match metadata, live or archived.
pub async fn get_game(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<GameResponse>, ObserverError> {
    let game = state.registry.lookup(&GameId::from(id)).await?;
    Ok(Json(GameResponse { game }))
}

// ---------------------------------------------------------------------------
// POST /games/{id}/events
// ---------------------------------------------------------------------------

/// Append an event to a live match.
///
/// Returns `202` with the [`AppendOutcome`]. Events for a match that has
/// already ended are accepted and reported as ignored.
pub async fn append_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<GameEvent>, JsonRejection>,
) -> Result<(StatusCode, Json<AppendOutcome>), ObserverError> {
    let Json(event) = payload?;
    let outcome = state.registry.append(&GameId::from(id), event).await?;
    Ok((StatusCode::ACCEPTED, Json(outcome)))
}
