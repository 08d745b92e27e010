//! Archive encoding and retry policy.
//!
//! An archived match is two independent store records: the JSON event
//! history and the JSON [`Game`](relay_types::Game) descriptor. Either
//! write may fail on its own; the registry tracks which record landed and
//! only re-sends the other.

use std::time::Duration;

use rand::Rng as _;
use relay_types::{GameEvent, GameId};

use crate::config::ArchiveConfig;
use crate::error::RelayError;
use crate::state::MatchState;

/// How hard to try when writing an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchivePolicy {
    /// Attempts made while handling the terminal event (at least one).
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
}

impl ArchivePolicy {
    /// Build the policy from its configuration section.
    pub const fn from_config(config: &ArchiveConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Attempts to make, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after failed attempt number `attempt` (1-based).
    ///
    /// Doubles from `initial_backoff`, capped at `max_backoff`, plus up to
    /// 10% random jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let base = self
            .initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff);
        let spread = u64::try_from(base.as_millis() / 10).unwrap_or(u64::MAX);
        let jitter = if spread == 0 {
            0
        } else {
            rand::rng().random_range(0..=spread)
        };
        base.saturating_add(Duration::from_millis(jitter))
    }
}

impl Default for ArchivePolicy {
    fn default() -> Self {
        Self::from_config(&ArchiveConfig::default())
    }
}

/// Serialized archive records for one match.
#[derive(Debug, Clone)]
pub(crate) struct EncodedArchive {
    pub(crate) events: String,
    pub(crate) metadata: String,
}

/// Serialize the frozen history and descriptor of an ended match.
pub(crate) fn encode(id: &GameId, state: &MatchState) -> Result<EncodedArchive, RelayError> {
    let events = serde_json::to_string(&state.history).map_err(|e| RelayError::malformed(id, e))?;
    let metadata = serde_json::to_string(&state.game).map_err(|e| RelayError::malformed(id, e))?;
    Ok(EncodedArchive { events, metadata })
}

/// Decode an archived event history.
pub(crate) fn decode_events(id: &GameId, raw: &str) -> Result<Vec<GameEvent>, RelayError> {
    serde_json::from_str(raw).map_err(|e| RelayError::malformed(id, e))
}
