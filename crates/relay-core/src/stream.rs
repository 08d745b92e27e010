//! The event sequence handed to one observer.
//!
//! A [`GameEventStream`] yields the history recorded at subscribe time,
//! then (for live matches) whatever the registry pushes into the
//! observer's delivery-queue. It is consumed once. Dropping it detaches
//! the queue from the match immediately, so appends stop targeting it.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use relay_types::{GameEvent, GameId, ObserverId};
use tokio::sync::mpsc;
use tracing::debug;

use crate::state::MatchState;

/// Where the events of a stream come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    /// Resident match, still live: history then a live tail.
    Live,
    /// Resident match that has ended but is not yet evicted.
    Memory,
    /// Archived record loaded from the durable store.
    Archive,
}

/// How a stream finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Every event of the match was yielded.
    Completed,
    /// The observer fell behind and was disconnected before the match
    /// ended; re-subscribing replays from the start.
    Lagged,
}

/// Receiving side of an attached observer.
struct LiveTail {
    observer: ObserverId,
    rx: mpsc::Receiver<GameEvent>,
    registration: Weak<Mutex<MatchState>>,
}

impl Drop for LiveTail {
    fn drop(&mut self) {
        if let Some(state) = self.registration.upgrade()
            && state.lock().detach(self.observer)
        {
            debug!(observer_id = %self.observer, "Observer detached");
        }
    }
}

/// Ordered sequence of [`GameEvent`]s for one observer.
pub struct GameEventStream {
    game_id: GameId,
    source: StreamSource,
    backlog: VecDeque<GameEvent>,
    tail: Option<LiveTail>,
    saw_terminal: bool,
}

impl GameEventStream {
    pub(crate) fn live(
        game_id: GameId,
        backlog: Vec<GameEvent>,
        observer: ObserverId,
        rx: mpsc::Receiver<GameEvent>,
        registration: Weak<Mutex<MatchState>>,
    ) -> Self {
        Self {
            game_id,
            source: StreamSource::Live,
            backlog: backlog.into(),
            tail: Some(LiveTail {
                observer,
                rx,
                registration,
            }),
            saw_terminal: false,
        }
    }

    pub(crate) fn replay(game_id: GameId, events: Vec<GameEvent>, source: StreamSource) -> Self {
        Self {
            game_id,
            source,
            backlog: events.into(),
            tail: None,
            saw_terminal: false,
        }
    }

    /// Match this stream belongs to.
    pub const fn game_id(&self) -> &GameId {
        &self.game_id
    }

    /// Where the events come from.
    pub const fn source(&self) -> StreamSource {
        self.source
    }

    /// Observer identifier, while a live tail is attached.
    pub fn observer_id(&self) -> Option<ObserverId> {
        self.tail.as_ref().map(|t| t.observer)
    }

    /// How the stream finished. Only meaningful once it has yielded `None`.
    pub const fn end(&self) -> StreamEnd {
        if self.saw_terminal || !matches!(self.source, StreamSource::Live) {
            StreamEnd::Completed
        } else {
            StreamEnd::Lagged
        }
    }

    fn yielded(&mut self, event: GameEvent) -> Poll<Option<GameEvent>> {
        if event.is_terminal() {
            self.saw_terminal = true;
        }
        Poll::Ready(Some(event))
    }
}

impl Stream for GameEventStream {
    type Item = GameEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(event) = this.backlog.pop_front() {
            return this.yielded(event);
        }

        let Some(tail) = this.tail.as_mut() else {
            return Poll::Ready(None);
        };

        match tail.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => this.yielded(event),
            Poll::Ready(None) => {
                this.tail = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl core::fmt::Debug for GameEventStream {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GameEventStream")
            .field("game_id", &self.game_id)
            .field("source", &self.source)
            .field("buffered", &self.backlog.len())
            .field("observer_id", &self.observer_id())
            .finish()
    }
}
