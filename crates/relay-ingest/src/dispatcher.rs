//! Routing of inbound messages into the registry.
//!
//! Registrations are applied inline. Events go to a per-match worker task
//! through a bounded queue, so each match has exactly one writer and its
//! events are appended in arrival order, while a match stuck in archival
//! only holds up its own queue.

use std::collections::HashMap;
use std::sync::Arc;

use relay_core::{AppendOutcome, GameRegistry, MatchPhase, RelayError};
use relay_types::{Game, GameEvent, GameId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::IngestError;
use crate::subject::{self, Route};

/// Queue depth per match worker.
pub const DEFAULT_WORKER_CAPACITY: usize = 256;

struct Worker {
    tx: mpsc::Sender<GameEvent>,
    handle: JoinHandle<()>,
}

/// Routes decoded messages to the registry.
pub struct Dispatcher {
    registry: Arc<GameRegistry>,
    prefix: String,
    capacity: usize,
    workers: HashMap<GameId, Worker>,
    /// Workers that were handed a terminal event and are finishing up.
    retiring: HashMap<GameId, JoinHandle<()>>,
}

impl Dispatcher {
    /// Create a dispatcher for subjects under `prefix`.
    pub fn new(registry: Arc<GameRegistry>, prefix: impl Into<String>) -> Self {
        Self {
            registry,
            prefix: prefix.into(),
            capacity: DEFAULT_WORKER_CAPACITY,
            workers: HashMap::new(),
            retiring: HashMap::new(),
        }
    }

    /// Override the per-match queue depth.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Subject prefix this dispatcher routes.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of matches with a running worker.
    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    /// Route one message.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::UnknownSubject`] for subjects outside the
    /// layout and [`IngestError::Parse`] for payloads that do not decode.
    /// Neither touches the registry.
    pub async fn dispatch(&mut self, subject: &str, payload: &[u8]) -> Result<(), IngestError> {
        match subject::route(&self.prefix, subject) {
            Some(Route::Register) => {
                let game: Game = decode(subject, payload)?;
                self.register(game);
                Ok(())
            }
            Some(Route::Events(id)) => {
                let event: GameEvent = decode(subject, payload)?;
                self.forward(id, event).await;
                Ok(())
            }
            None => Err(IngestError::UnknownSubject(subject.to_owned())),
        }
    }

    fn register(&mut self, game: Game) {
        self.prune();
        match self.registry.register(game) {
            Ok(_) => {}
            Err(RelayError::AlreadyRegistered(id)) => {
                warn!(game_id = %id, "Duplicate registration ignored");
            }
            Err(e) => warn!(error = %e, "Registration failed"),
        }
    }

    async fn forward(&mut self, id: GameId, event: GameEvent) {
        let terminal = event.is_terminal();
        let mut event = Some(event);

        // A worker that exited early hands the event back; respawn once.
        for _ in 0..2 {
            let Some(pending) = event.take() else { break };
            let Some(worker) = self.worker(&id) else {
                debug!(game_id = %id, kind = %pending.event_type, "Event for inactive game dropped");
                return;
            };
            let tx = worker.tx.clone();
            if let Err(mpsc::error::SendError(returned)) = tx.send(pending).await {
                debug!(game_id = %id, "Worker gone, respawning");
                self.workers.remove(&id);
                event = Some(returned);
            }
        }
        if event.is_some() {
            warn!(game_id = %id, "Event dropped, worker unavailable");
        }

        if terminal && let Some(worker) = self.workers.remove(&id) {
            drop(worker.tx);
            self.retiring.insert(id, worker.handle);
        }
    }

    /// Worker for `id`, spawned on demand while the match is live.
    ///
    /// Nothing is spawned while the previous worker is still applying the
    /// terminal event, since the match can no longer accept events.
    fn worker(&mut self, id: &GameId) -> Option<&Worker> {
        if !self.workers.contains_key(id) {
            if let Some(handle) = self.retiring.get(id) {
                if !handle.is_finished() {
                    return None;
                }
                self.retiring.remove(id);
            }
            if self.registry.phase(id) != Some(MatchPhase::Live) {
                return None;
            }
            let (tx, rx) = mpsc::channel(self.capacity);
            let handle = tokio::spawn(run_worker(Arc::clone(&self.registry), id.clone(), rx));
            debug!(game_id = %id, "Worker started");
            self.workers.insert(id.clone(), Worker { tx, handle });
        }
        self.workers.get(id)
    }

    /// Forget workers that have already exited.
    fn prune(&mut self) {
        self.workers.retain(|_, worker| !worker.handle.is_finished());
        self.retiring.retain(|_, handle| !handle.is_finished());
    }

    /// Close every worker queue and wait for queued events to be applied.
    pub async fn shutdown(mut self) {
        let mut handles: Vec<JoinHandle<()>> = self.retiring.drain().map(|(_, handle)| handle).collect();
        handles.extend(self.workers.drain().map(|(_, worker)| worker.handle));
        info!(workers = handles.len(), "Draining ingest workers");
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Ingest worker panicked");
            }
        }
    }
}

impl core::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("prefix", &self.prefix)
            .field("capacity", &self.capacity)
            .field("workers", &self.workers.len())
            .field("retiring", &self.retiring.len())
            .finish()
    }
}

fn decode<T: serde::de::DeserializeOwned>(subject: &str, payload: &[u8]) -> Result<T, IngestError> {
    serde_json::from_slice(payload).map_err(|source| IngestError::Parse {
        subject: subject.to_owned(),
        source,
    })
}

/// Apply one match's events in order.
///
/// Exits after the terminal event, or once the registry stops accepting
/// events for the match.
async fn run_worker(registry: Arc<GameRegistry>, id: GameId, mut rx: mpsc::Receiver<GameEvent>) {
    while let Some(event) = rx.recv().await {
        let terminal = event.is_terminal();
        match registry.append(&id, event).await {
            Ok(AppendOutcome::ArchivePending { observers }) => {
                warn!(game_id = %id, observers, "Game ended, archive pending retry");
            }
            Ok(AppendOutcome::Ignored) => {
                debug!(game_id = %id, "Game no longer live");
                break;
            }
            Ok(outcome) => debug!(game_id = %id, ?outcome, "Event applied"),
            Err(e @ RelayError::UnknownMatch(_)) => {
                warn!(game_id = %id, error = %e, "Event rejected");
                break;
            }
            Err(e) => warn!(game_id = %id, error = %e, "Event rejected"),
        }
        if terminal {
            break;
        }
    }
    debug!(game_id = %id, "Worker stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use relay_core::RegistryOptions;
    use relay_store::keys::events_key;
    use relay_store::{DurableStore as _, MemoryStore};

    use super::*;

    const PREFIX: &str = "relay.games";

    fn setup() -> (Dispatcher, Arc<GameRegistry>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(GameRegistry::new(store.clone(), RegistryOptions::default()));
        (Dispatcher::new(Arc::clone(&registry), PREFIX), registry, store)
    }

    fn register_payload(id: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "ID": id, "Width": 11, "Height": 11, "Ruleset": { "Name": "standard" }
        }))
        .unwrap()
    }

    fn event_payload(kind: &str, turn: u32) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({ "Type": kind, "Data": { "Turn": turn } })).unwrap()
    }

    #[tokio::test]
    async fn full_match_is_applied_and_archived() {
        let (mut dispatcher, registry, store) = setup();

        dispatcher
            .dispatch("relay.games.register", &register_payload("m1"))
            .await
            .unwrap();
        for turn in 0..5 {
            dispatcher
                .dispatch("relay.games.m1.events", &event_payload("frame", turn))
                .await
                .unwrap();
        }
        dispatcher
            .dispatch("relay.games.m1.events", &event_payload("game_end", 5))
            .await
            .unwrap();
        assert_eq!(dispatcher.active_workers(), 0);

        dispatcher.shutdown().await;

        assert!(store.contains(&events_key(&GameId::new("m1"))));
        let raw = store.get("game:m1:events").await.unwrap();
        let history: Vec<GameEvent> = serde_json::from_str(&raw).unwrap();
        assert_eq!(history.len(), 6);
        assert!(history.last().unwrap().is_terminal());
        assert_eq!(registry.stats().resident, 0);
    }

    #[tokio::test]
    async fn malformed_payloads_are_skipped() {
        let (mut dispatcher, registry, _) = setup();

        let err = dispatcher
            .dispatch("relay.games.register", b"{not json")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Parse { .. }));

        let err = dispatcher
            .dispatch("relay.games.m1.events", b"[]")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Parse { .. }));

        assert_eq!(registry.stats().resident, 0);
        assert_eq!(dispatcher.active_workers(), 0);
    }

    #[tokio::test]
    async fn unknown_subject_is_rejected() {
        let (mut dispatcher, _, _) = setup();
        let err = dispatcher
            .dispatch("relay.games.m1.chat", b"{}")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::UnknownSubject(_)));
    }

    #[tokio::test]
    async fn events_for_unregistered_matches_spawn_no_workers() {
        let (mut dispatcher, registry, _) = setup();
        for n in 0..50 {
            dispatcher
                .dispatch(&format!("relay.games.ghost{n}.events"), &event_payload("frame", 0))
                .await
                .unwrap();
        }
        dispatcher
            .dispatch("relay.games.register", &register_payload("real"))
            .await
            .unwrap();

        assert_eq!(dispatcher.active_workers(), 0);
        assert_eq!(registry.stats().resident, 1);
    }

    #[tokio::test]
    async fn events_after_archival_spawn_no_workers() {
        let (mut dispatcher, _, store) = setup();
        dispatcher
            .dispatch("relay.games.register", &register_payload("m1"))
            .await
            .unwrap();
        dispatcher
            .dispatch("relay.games.m1.events", &event_payload("game_end", 1))
            .await
            .unwrap();
        for turn in 2..10 {
            dispatcher
                .dispatch("relay.games.m1.events", &event_payload("frame", turn))
                .await
                .unwrap();
        }
        assert_eq!(dispatcher.active_workers(), 0);

        dispatcher.shutdown().await;
        let raw = store.get("game:m1:events").await.unwrap();
        let history: Vec<GameEvent> = serde_json::from_str(&raw).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn worker_exits_when_match_is_unknown() {
        let (_, registry, _) = setup();
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(run_worker(registry, GameId::new("ghost"), rx));

        tx.send(GameEvent::frame(serde_json::Value::Null))
            .await
            .unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn duplicate_registration_is_not_an_error() {
        let (mut dispatcher, registry, _) = setup();
        dispatcher
            .dispatch("relay.games.register", &register_payload("m1"))
            .await
            .unwrap();
        dispatcher
            .dispatch("relay.games.register", &register_payload("m1"))
            .await
            .unwrap();
        assert_eq!(registry.stats().resident, 1);
    }
}
