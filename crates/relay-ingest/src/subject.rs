//! Subject layout.
//!
//! With prefix `relay.games`:
//!
//! - `relay.games.register` carries a JSON [`Game`](relay_types::Game)
//! - `relay.games.{game_id}.events` carries a JSON
//!   [`GameEvent`](relay_types::GameEvent)

use relay_types::GameId;

/// What an inbound message is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// A match registration.
    Register,
    /// An event for the given match.
    Events(GameId),
}

/// Wildcard subject covering every route under `prefix`.
pub fn wildcard(prefix: &str) -> String {
    format!("{prefix}.>")
}

/// Subject registrations are published on.
pub fn register_subject(prefix: &str) -> String {
    format!("{prefix}.register")
}

/// Subject events for `id` are published on.
pub fn events_subject(prefix: &str, id: &GameId) -> String {
    format!("{prefix}.{id}.events")
}

/// Classify `subject`. Returns `None` for anything outside the layout.
pub fn route(prefix: &str, subject: &str) -> Option<Route> {
    let rest = subject.strip_prefix(prefix)?.strip_prefix('.')?;
    if rest == "register" {
        return Some(Route::Register);
    }
    let id = rest.strip_suffix(".events")?;
    if id.is_empty() {
        return None;
    }
    Some(Route::Events(GameId::from(id)))
}
