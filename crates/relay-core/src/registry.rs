//! The game registry.
//!
//! [`GameRegistry`] is the single authority on which matches are live and
//! who is watching them. It is constructed once at startup and shared
//! (behind an [`Arc`]) with every transport and ingestion task.
//!
//! # Locking
//!
//! The id-to-match map is a sharded [`DashMap`]; its shard locks are held
//! only long enough to clone the match handle. Each match has its own
//! mutex guarding history, phase, and observers, so two matches never
//! contend. No code path takes a map lock while holding a match lock, and
//! no match lock is held across an `.await`.
//!
//! # Lifecycle of a match
//!
//! ```text
//! register --> Live --(terminal event)--> Archiving --(writes ok)--> Archived --> evicted
//!                                              |                         ^
//!                                              +--(writes fail)--> ArchivePending
//!                                                                  (retry sweep)
//! ```

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use relay_store::DurableStore;
use relay_store::keys::{events_key, metadata_key};
use relay_types::{Game, GameEvent, GameId, GameStatus};
use tracing::{debug, error, info, warn};

use crate::archive::{self, ArchivePolicy, EncodedArchive};
use crate::config::{ArchiveConfig, RegistryConfig};
use crate::error::RelayError;
use crate::state::{ArchiveProgress, DetachReason, MatchPhase, MatchState, SharedMatch};
use crate::stream::{GameEventStream, StreamSource};

/// Registry tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Capacity of each observer's delivery-queue.
    pub observer_queue_capacity: usize,
    /// Drop matches from memory once archived.
    pub evict_on_archive: bool,
    /// Archive write retry policy.
    pub archive: ArchivePolicy,
}

impl RegistryOptions {
    /// Build the options from their configuration sections.
    pub const fn from_config(registry: &RegistryConfig, archive: &ArchiveConfig) -> Self {
        Self {
            observer_queue_capacity: registry.observer_queue_capacity,
            evict_on_archive: registry.evict_on_archive,
            archive: ArchivePolicy::from_config(archive),
        }
    }
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self::from_config(&RegistryConfig::default(), &ArchiveConfig::default())
    }
}

/// What happened to an appended event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AppendOutcome {
    /// Recorded and offered to the attached observers.
    Delivered {
        /// Observers the event was queued for.
        observers: usize,
    },
    /// Terminal event recorded, delivered, and the match archived.
    Archived {
        /// Observers the event was queued for.
        observers: usize,
    },
    /// Terminal event recorded and delivered, but the archive could not be
    /// fully written. The match stays in memory until a retry succeeds.
    ArchivePending {
        /// Observers the event was queued for.
        observers: usize,
    },
    /// The match had already ended; the event was dropped.
    Ignored,
}

/// Point-in-time counts for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RegistryStats {
    /// Matches held in memory, in any phase.
    pub resident: usize,
    /// Matches still accepting events.
    pub live: usize,
    /// Ended matches whose archive is not yet fully written.
    pub pending_archives: usize,
    /// Observers attached across all live matches.
    pub observers: usize,
}

/// The in-memory registry of matches.
pub struct GameRegistry {
    matches: DashMap<GameId, SharedMatch>,
    store: Arc<dyn DurableStore>,
    options: RegistryOptions,
}

impl GameRegistry {
    /// Create an empty registry archiving into `store`.
    pub fn new(store: Arc<dyn DurableStore>, options: RegistryOptions) -> Self {
        Self {
            matches: DashMap::new(),
            store,
            options,
        }
    }

    /// The options this registry was built with.
    pub const fn options(&self) -> &RegistryOptions {
        &self.options
    }

    // =========================================================================
    // Registration and lookup
    // =========================================================================

    /// Start tracking a match.
    ///
    /// The match becomes live with an empty history. Its status is forced to
    /// running: the registry is the only writer of status. Returns the
    /// descriptor as stored.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::AlreadyRegistered`] if a match with the same
    /// identifier is resident. Matches already archived and evicted are not
    /// checked; re-registering one starts a fresh match whose archive will
    /// replace the old records.
    pub fn register(&self, mut game: Game) -> Result<Game, RelayError> {
        game.status = GameStatus::Running;
        match self.matches.entry(game.id.clone()) {
            Entry::Occupied(entry) => Err(RelayError::AlreadyRegistered(entry.key().clone())),
            Entry::Vacant(entry) => {
                info!(
                    game_id = %game.id,
                    width = game.width,
                    height = game.height,
                    ruleset = %game.ruleset.name,
                    source = %game.source,
                    "Game registered"
                );
                entry.insert(MatchState::shared(game.clone()));
                Ok(game)
            }
        }
    }

    /// Current descriptor of a match, from memory if resident, otherwise
    /// from the archived metadata record.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UnknownMatch`] if neither source has it,
    /// [`RelayError::StoreUnavailable`] if the store read fails, or
    /// [`RelayError::MalformedRecord`] if the stored record does not decode.
    pub async fn lookup(&self, id: &GameId) -> Result<Game, RelayError> {
        if let Some(shared) = self.resident(id) {
            return Ok(shared.lock().game.clone());
        }

        let raw = self
            .store
            .get(&metadata_key(id))
            .await
            .map_err(|e| RelayError::from_store_read(id, e))?;
        serde_json::from_str(&raw).map_err(|e| RelayError::malformed(id, e))
    }

    // =========================================================================
    // Broadcast and archival
    // =========================================================================

    /// Record an event for a live match and deliver it to every attached
    /// observer.
    ///
    /// A terminal event also ends the match and archives it before this
    /// returns. Events for a match that has already ended are dropped with
    /// [`AppendOutcome::Ignored`], which makes repeated terminal events
    /// harmless.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UnknownMatch`] if the match is not resident.
    pub async fn append(&self, id: &GameId, event: GameEvent) -> Result<AppendOutcome, RelayError> {
        let shared = self
            .resident(id)
            .ok_or_else(|| RelayError::UnknownMatch(id.clone()))?;

        let terminal = event.is_terminal();
        let Some(observers) = Self::record(id, &shared, event) else {
            return Ok(AppendOutcome::Ignored);
        };

        if !terminal {
            return Ok(AppendOutcome::Delivered { observers });
        }

        info!(game_id = %id, observers, "Game ended, archiving");
        if self.archive(id, &shared).await {
            Ok(AppendOutcome::Archived { observers })
        } else {
            Ok(AppendOutcome::ArchivePending { observers })
        }
    }

    /// Append and fan out under the match lock. Returns `None` if the match
    /// is no longer live.
    fn record(id: &GameId, shared: &SharedMatch, event: GameEvent) -> Option<usize> {
        let mut state = shared.lock();
        if !state.is_live() {
            warn!(
                game_id = %id,
                event_type = %event.event_type,
                "Event for ended game dropped"
            );
            return None;
        }

        let terminal = event.is_terminal();
        let fanout = state.record(event);
        for (observer, reason) in &fanout.detached {
            let err = RelayError::ObserverUnreachable(*observer);
            match reason {
                DetachReason::Lagged => {
                    warn!(game_id = %id, error = %err, "Observer fell behind, disconnecting");
                }
                DetachReason::Gone => debug!(game_id = %id, error = %err, "Observer gone"),
            }
        }
        if terminal {
            state.close();
        }
        Some(fanout.delivered)
    }

    /// Write both archive records for an ended match, retrying with backoff.
    ///
    /// The caller must have moved the match out of the live phase. Returns
    /// whether the archive is complete.
    async fn archive(&self, id: &GameId, shared: &SharedMatch) -> bool {
        let encoded = {
            let state = shared.lock();
            archive::encode(id, &state)
        };
        let encoded = match encoded {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(game_id = %id, error = %e, "Failed to encode archive");
                shared.lock().phase = MatchPhase::ArchivePending;
                return false;
            }
        };

        let policy = self.options.archive;
        let mut attempt: u32 = 1;
        loop {
            if self.write_missing(id, shared, &encoded).await.is_complete() {
                break;
            }
            if attempt >= policy.attempts() {
                shared.lock().phase = MatchPhase::ArchivePending;
                error!(
                    game_id = %id,
                    attempts = attempt,
                    "Archive incomplete, keeping game in memory for retry"
                );
                return false;
            }
            let delay = policy.backoff(attempt);
            warn!(
                game_id = %id,
                attempt,
                delay = ?delay,
                "Archive write failed, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }

        shared.lock().phase = MatchPhase::Archived;
        info!(game_id = %id, backend = self.store.backend(), "Game archived");

        if self.options.evict_on_archive
            && self
                .matches
                .remove_if(id, |_, resident| Arc::ptr_eq(resident, shared))
                .is_some()
        {
            debug!(game_id = %id, "Archived game evicted from memory");
        }
        true
    }

    /// Write whichever archive records have not landed yet.
    async fn write_missing(
        &self,
        id: &GameId,
        shared: &SharedMatch,
        encoded: &EncodedArchive,
    ) -> ArchiveProgress {
        let mut progress = shared.lock().written;

        if !progress.events {
            match self.store.set(&events_key(id), &encoded.events).await {
                Ok(()) => {
                    progress.events = true;
                    shared.lock().written.events = true;
                }
                Err(e) => warn!(game_id = %id, error = %e, "Failed to write archived events"),
            }
        }

        if !progress.metadata {
            match self.store.set(&metadata_key(id), &encoded.metadata).await {
                Ok(()) => {
                    progress.metadata = true;
                    shared.lock().written.metadata = true;
                }
                Err(e) => warn!(game_id = %id, error = %e, "Failed to write archived metadata"),
            }
        }

        progress
    }

    /// Retry every archive left pending by an earlier failure.
    ///
    /// Returns the number of matches whose archive is now complete.
    pub async fn retry_pending_archives(&self) -> usize {
        let pending = self.claim_pending();
        if pending.is_empty() {
            return 0;
        }

        info!(count = pending.len(), "Retrying pending archives");
        let mut completed: usize = 0;
        for (id, shared) in pending {
            if self.archive(&id, &shared).await {
                completed = completed.saturating_add(1);
            }
        }
        completed
    }

    /// Move every pending match to the archiving phase and hand them back.
    /// Claiming under the match lock keeps two sweeps from writing the same
    /// archive.
    fn claim_pending(&self) -> Vec<(GameId, SharedMatch)> {
        self.matches
            .iter()
            .filter_map(|entry| {
                let mut state = entry.value().lock();
                (state.phase == MatchPhase::ArchivePending).then(|| {
                    state.phase = MatchPhase::Archiving;
                    (entry.key().clone(), Arc::clone(entry.value()))
                })
            })
            .collect()
    }

    // =========================================================================
    // Subscription
    // =========================================================================

    /// Open an event stream for a match.
    ///
    /// For a live match the stream yields the history recorded so far, then
    /// every later event, and ends after the terminal event. For an ended
    /// match it replays the full history (from memory while resident,
    /// otherwise from the store) and ends.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UnknownMatch`] if the match is neither resident
    /// nor archived, [`RelayError::StoreUnavailable`] if the store read
    /// fails, or [`RelayError::MalformedRecord`] if the archived history does
    /// not decode.
    pub async fn subscribe(&self, id: &GameId) -> Result<GameEventStream, RelayError> {
        if let Some(stream) = self.subscribe_resident(id) {
            return Ok(stream);
        }

        let raw = self
            .store
            .get(&events_key(id))
            .await
            .map_err(|e| RelayError::from_store_read(id, e))?;
        let events = archive::decode_events(id, &raw)?;
        debug!(game_id = %id, events = events.len(), "Replaying archived game");
        Ok(GameEventStream::replay(id.clone(), events, StreamSource::Archive))
    }

    fn subscribe_resident(&self, id: &GameId) -> Option<GameEventStream> {
        let shared = self.resident(id)?;
        let mut state = shared.lock();

        if !state.is_live() {
            return Some(GameEventStream::replay(
                id.clone(),
                state.history.clone(),
                StreamSource::Memory,
            ));
        }

        let (observer, rx, backlog) = state.attach(self.options.observer_queue_capacity);
        debug!(
            game_id = %id,
            observer_id = %observer,
            backlog = backlog.len(),
            observers = state.observer_count(),
            "Observer attached"
        );
        drop(state);
        Some(GameEventStream::live(
            id.clone(),
            backlog,
            observer,
            rx,
            Arc::downgrade(&shared),
        ))
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Phase of a resident match, `None` if it is not in memory.
    pub fn phase(&self, id: &GameId) -> Option<MatchPhase> {
        self.resident(id).map(|shared| shared.lock().phase)
    }

    /// Observers attached to a resident match.
    pub fn observer_count(&self, id: &GameId) -> Option<usize> {
        self.resident(id).map(|shared| shared.lock().observer_count())
    }

    /// Counts across all resident matches.
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for entry in &self.matches {
            let state = entry.value().lock();
            stats.resident = stats.resident.saturating_add(1);
            stats.observers = stats.observers.saturating_add(state.observer_count());
            match state.phase {
                MatchPhase::Live => stats.live = stats.live.saturating_add(1),
                MatchPhase::Archiving | MatchPhase::ArchivePending => {
                    stats.pending_archives = stats.pending_archives.saturating_add(1);
                }
                MatchPhase::Archived => {}
            }
        }
        stats
    }

    fn resident(&self, id: &GameId) -> Option<SharedMatch> {
        self.matches.get(id).map(|entry| Arc::clone(entry.value()))
    }
}

impl core::fmt::Debug for GameRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GameRegistry")
            .field("resident", &self.matches.len())
            .field("backend", &self.store.backend())
            .field("options", &self.options)
            .finish()
    }
}
