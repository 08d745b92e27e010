//! Error types for the relay core.

use relay_store::StoreError;
use relay_types::{GameId, ObserverId};

/// Errors surfaced by [`GameRegistry`](crate::registry::GameRegistry)
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Neither the registry nor the store knows this match.
    #[error("game not found: {0}")]
    UnknownMatch(GameId),

    /// A match with this identifier is already resident.
    #[error("game already registered: {0}")]
    AlreadyRegistered(GameId),

    /// The durable store failed to serve a read or write.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// A stored or inbound record did not decode.
    #[error("malformed record for game {game_id}: {source}")]
    MalformedRecord {
        /// Match the record belongs to.
        game_id: GameId,
        /// The underlying decoding error.
        #[source]
        source: serde_json::Error,
    },

    /// An observer's delivery-queue could not accept an event.
    #[error("observer {0} unreachable")]
    ObserverUnreachable(ObserverId),
}

impl RelayError {
    /// Map a store read failure: a missing key means the match is unknown,
    /// anything else means the store is unavailable.
    pub(crate) fn from_store_read(id: &GameId, err: StoreError) -> Self {
        if err.is_not_found() {
            Self::UnknownMatch(id.clone())
        } else {
            Self::StoreUnavailable(err)
        }
    }

    pub(crate) fn malformed(id: &GameId, source: serde_json::Error) -> Self {
        Self::MalformedRecord {
            game_id: id.clone(),
            source,
        }
    }
}
