//! The match descriptor.
//!
//! A [`Game`] is created by the match engine when a match starts and is
//! immutable from then on, except for [`Game::status`], which only ever
//! moves from [`GameStatus::Running`] to [`GameStatus::Ended`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::GameId;

/// Lifecycle status of a match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum GameStatus {
    /// The match engine is still producing events.
    #[default]
    Running,
    /// The terminal event has been processed.
    Ended,
}

/// Rules the match is played under.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "PascalCase")]
#[ts(export, export_to = "bindings/")]
pub struct Ruleset {
    /// Ruleset name (e.g. `standard`, `royale`).
    pub name: String,
    /// Free-form ruleset parameters, stringly typed as the engine emits them.
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
    /// Names of the rule stages active in this match, in pipeline order.
    #[serde(default)]
    pub stages: Vec<String>,
}

/// Identity and descriptive metadata for one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "PascalCase")]
#[ts(export, export_to = "bindings/")]
pub struct Game {
    /// Unique match identifier.
    #[serde(rename = "ID")]
    pub id: GameId,
    /// Lifecycle status.
    #[serde(default)]
    pub status: GameStatus,
    /// Board width in cells.
    pub width: u32,
    /// Board height in cells.
    pub height: u32,
    /// Ruleset the match is played under.
    #[serde(default)]
    pub ruleset: Ruleset,
    /// Board map name, when the engine uses one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,
    /// Where the play request came from (e.g. `API`, `CLI`).
    #[serde(default)]
    pub source: String,
}

impl Game {
    /// Create a running match descriptor.
    pub fn new(id: impl Into<GameId>, width: u32, height: u32, ruleset: Ruleset) -> Self {
        Self {
            id: id.into(),
            status: GameStatus::Running,
            width,
            height,
            ruleset,
            map: None,
            source: String::new(),
        }
    }

    /// Set the provenance tag.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Whether the match is still running.
    pub const fn is_running(&self) -> bool {
        matches!(self.status, GameStatus::Running)
    }

    /// Mark the match as ended. There is no way back to running.
    pub const fn end(&mut self) {
        self.status = GameStatus::Ended;
    }
}
