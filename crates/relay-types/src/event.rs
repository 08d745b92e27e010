//! Match events.
//!
//! A [`GameEvent`] is a kind tag plus an opaque JSON payload. The relay
//! never inspects the payload; the only kind it understands is
//! [`EventType::GameEnd`], which closes the match.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Kind tag of a [`GameEvent`].
///
/// Unknown tags are carried through untouched as [`EventType::Other`] so
/// that new engine event kinds reach observers without a relay release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// A board frame (snake positions, food, hazards).
    Frame,
    /// End of match. Exactly one per match is expected.
    GameEnd,
    /// Any other kind, preserved verbatim.
    Other(String),
}

impl EventType {
    /// Wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Frame => "frame",
            Self::GameEnd => "game_end",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for EventType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "frame" => Self::Frame,
            "game_end" => Self::GameEnd,
            _ => Self::Other(tag),
        }
    }
}

impl From<EventType> for String {
    fn from(kind: EventType) -> Self {
        match kind {
            EventType::Other(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

impl core::fmt::Display for EventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One atomic state change in a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GameEvent {
    /// Kind tag.
    #[serde(rename = "Type")]
    #[ts(type = "string")]
    pub event_type: EventType,
    /// Kind-specific payload.
    #[serde(rename = "Data", default)]
    pub data: serde_json::Value,
}

impl GameEvent {
    /// Build an event of the given kind.
    pub const fn new(event_type: EventType, data: serde_json::Value) -> Self {
        Self { event_type, data }
    }

    /// A board frame event.
    pub const fn frame(data: serde_json::Value) -> Self {
        Self::new(EventType::Frame, data)
    }

    /// The end-of-match event.
    pub const fn game_end(data: serde_json::Value) -> Self {
        Self::new(EventType::GameEnd, data)
    }

    /// Whether this event closes the match.
    pub const fn is_terminal(&self) -> bool {
        matches!(self.event_type, EventType::GameEnd)
    }
}
