//! Shared type definitions for the Arena Relay.
//!
//! Every crate in the workspace speaks in these types. The wire format
//! matches the one the board front-end already consumes (`PascalCase`
//! field names, `{"Type": ..., "Data": ...}` events), and `ts-rs`
//! generates `TypeScript` bindings for it.
//!
//! # Modules
//!
//! - [`ids`] -- Match and observer identifiers
//! - [`game`] -- The [`Game`] descriptor and its ruleset
//! - [`event`] -- The [`GameEvent`] record and its kind tag

pub mod event;
pub mod game;
pub mod ids;

// Re-export all public types at crate root for convenience.
pub use event::{EventType, GameEvent};
pub use game::{Game, GameStatus, Ruleset};
pub use ids::{GameId, ObserverId};

#[cfg(test)]
mod tests {
    #[test]
    fn export_bindings() {
        // Writes the TypeScript declarations to `bindings/`.
        use ts_rs::TS;

        let _ = crate::ids::GameId::export_all();
        let _ = crate::game::GameStatus::export_all();
        let _ = crate::game::Ruleset::export_all();
        let _ = crate::game::Game::export_all();
        let _ = crate::event::GameEvent::export_all();
    }
}
