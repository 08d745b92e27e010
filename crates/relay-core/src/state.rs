//! Per-match in-memory state.
//!
//! A [`MatchState`] is only ever touched through its [`SharedMatch`] lock.
//! History appends, observer attach, and observer detach all happen under
//! that one lock, which is what makes "snapshot history, then register for
//! future events" atomic with respect to concurrent appends.

use std::sync::Arc;

use parking_lot::Mutex;
use relay_types::{Game, GameEvent, ObserverId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// A match state behind its lock.
pub(crate) type SharedMatch = Arc<Mutex<MatchState>>;

/// Where a match is in its live-to-archived lifecycle.
///
/// Only [`MatchPhase::Live`] accepts events and attaches observers; every
/// other phase serves the frozen history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Accepting events.
    Live,
    /// Terminal event processed; archive writes in flight.
    Archiving,
    /// Archive writes failed; waiting for the retry sweep.
    ArchivePending,
    /// Both archive records are in the store.
    Archived,
}

/// Which archive records have reached the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ArchiveProgress {
    pub(crate) events: bool,
    pub(crate) metadata: bool,
}

impl ArchiveProgress {
    pub(crate) const fn is_complete(self) -> bool {
        self.events && self.metadata
    }
}

/// Why an observer was detached during fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DetachReason {
    /// Its queue was full: the slow-observer policy disconnects it.
    Lagged,
    /// Its receiving side is gone.
    Gone,
}

/// Result of recording one event.
#[derive(Debug, Default)]
pub(crate) struct FanOut {
    pub(crate) delivered: usize,
    pub(crate) detached: Vec<(ObserverId, DetachReason)>,
}

#[derive(Debug)]
struct Observer {
    id: ObserverId,
    tx: mpsc::Sender<GameEvent>,
}

/// Live state of one match.
#[derive(Debug)]
pub(crate) struct MatchState {
    pub(crate) game: Game,
    pub(crate) history: Vec<GameEvent>,
    pub(crate) phase: MatchPhase,
    pub(crate) written: ArchiveProgress,
    /// Attached observers, in attach order.
    observers: Vec<Observer>,
}

impl MatchState {
    pub(crate) const fn new(game: Game) -> Self {
        Self {
            game,
            history: Vec::new(),
            phase: MatchPhase::Live,
            written: ArchiveProgress {
                events: false,
                metadata: false,
            },
            observers: Vec::new(),
        }
    }

    pub(crate) fn shared(game: Game) -> SharedMatch {
        Arc::new(Mutex::new(Self::new(game)))
    }

    pub(crate) const fn is_live(&self) -> bool {
        matches!(self.phase, MatchPhase::Live)
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Attach a new observer and return its queue together with a copy of
    /// the history recorded so far.
    pub(crate) fn attach(
        &mut self,
        capacity: usize,
    ) -> (ObserverId, mpsc::Receiver<GameEvent>, Vec<GameEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = ObserverId::new();
        self.observers.push(Observer { id, tx });
        (id, rx, self.history.clone())
    }

    /// Remove an observer. Returns whether it was still attached.
    pub(crate) fn detach(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|o| o.id != id);
        self.observers.len() != before
    }

    /// Append `event` to history and offer a copy to every observer.
    ///
    /// Never waits on a queue: an observer whose queue is full or closed is
    /// dropped from the set.
    pub(crate) fn record(&mut self, event: GameEvent) -> FanOut {
        let mut fanout = FanOut::default();
        self.observers.retain(|observer| match observer.tx.try_send(event.clone()) {
            Ok(()) => {
                fanout.delivered = fanout.delivered.saturating_add(1);
                true
            }
            Err(TrySendError::Full(_)) => {
                fanout.detached.push((observer.id, DetachReason::Lagged));
                false
            }
            Err(TrySendError::Closed(_)) => {
                fanout.detached.push((observer.id, DetachReason::Gone));
                false
            }
        });
        self.history.push(event);
        fanout
    }

    /// Leave the live phase after the terminal event.
    ///
    /// Ends the game, and releases every observer queue so their streams
    /// close once drained.
    pub(crate) fn close(&mut self) {
        self.phase = MatchPhase::Archiving;
        self.game.end();
        self.observers.clear();
    }
}
