//! End-to-end behavior of the game registry against the in-memory store.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt as _;
use relay_core::{
    AppendOutcome, ArchivePolicy, GameRegistry, MatchPhase, RegistryOptions, RelayError,
    StreamEnd, StreamSource,
};
use relay_store::MemoryStore;
use relay_store::keys::{events_key, metadata_key};
use relay_types::{Game, GameEvent, GameId, GameStatus, Ruleset};

fn options(capacity: usize, evict: bool) -> RegistryOptions {
    RegistryOptions {
        observer_queue_capacity: capacity,
        evict_on_archive: evict,
        archive: ArchivePolicy {
            max_attempts: 2,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        },
    }
}

fn registry(store: &Arc<MemoryStore>, evict: bool) -> GameRegistry {
    GameRegistry::new(store.clone(), options(16, evict))
}

fn game(id: &str) -> Game {
    Game::new(id, 11, 11, Ruleset::default()).with_source("league")
}

fn frame(turn: u32) -> GameEvent {
    GameEvent::frame(serde_json::json!({ "Turn": turn }))
}

fn game_end() -> GameEvent {
    GameEvent::game_end(serde_json::json!({ "Winner": "snek" }))
}

// =============================================================================
// Full match lifecycle
// =============================================================================

#[tokio::test]
async fn early_and_late_observers_see_the_whole_match() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(&store, true);
    let id = GameId::new("m1");
    registry.register(game("m1")).unwrap();

    let early = registry.subscribe(&id).await.unwrap();
    assert_eq!(early.source(), StreamSource::Live);

    registry.append(&id, frame(0)).await.unwrap();
    registry.append(&id, frame(1)).await.unwrap();

    let late = registry.subscribe(&id).await.unwrap();
    let outcome = registry.append(&id, game_end()).await.unwrap();
    assert_eq!(outcome, AppendOutcome::Archived { observers: 2 });

    let expected = vec![frame(0), frame(1), game_end()];
    let early_events: Vec<_> = early.collect().await;
    let late_events: Vec<_> = late.collect().await;
    assert_eq!(early_events, expected);
    assert_eq!(late_events, expected);

    // Archived and evicted: served from the store from now on.
    assert_eq!(registry.phase(&id), None);
    let replay = registry.subscribe(&id).await.unwrap();
    assert_eq!(replay.source(), StreamSource::Archive);
    let replayed: Vec<_> = replay.collect().await;
    assert_eq!(replayed, expected);

    let archived = registry.lookup(&id).await.unwrap();
    assert_eq!(archived.status, GameStatus::Ended);
    assert_eq!(archived.source, "league");
}

#[tokio::test]
async fn stream_reports_completion() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(&store, true);
    let id = GameId::new("m1");
    registry.register(game("m1")).unwrap();

    let mut stream = registry.subscribe(&id).await.unwrap();
    registry.append(&id, game_end()).await.unwrap();

    while stream.next().await.is_some() {}
    assert_eq!(stream.end(), StreamEnd::Completed);
}

#[tokio::test]
async fn archive_writes_both_records() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(&store, true);
    let id = GameId::new("m1");
    registry.register(game("m1")).unwrap();
    registry.append(&id, frame(0)).await.unwrap();
    registry.append(&id, game_end()).await.unwrap();

    assert_eq!(store.write_log(), vec![events_key(&id), metadata_key(&id)]);
    assert!(store.contains("game:m1:events"));
    assert!(store.contains("game:m1:metadata"));
}

// =============================================================================
// Registration and lookup
// =============================================================================

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(&store, true);
    registry.register(game("m1")).unwrap();

    let err = registry.register(game("m1")).unwrap_err();
    assert!(matches!(err, RelayError::AlreadyRegistered(ref id) if id.as_str() == "m1"));
}

#[tokio::test]
async fn registration_forces_running_status() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(&store, true);
    let mut ended = game("m1");
    ended.status = GameStatus::Ended;
    let stored = registry.register(ended).unwrap();
    assert_eq!(stored.status, GameStatus::Running);

    let found = registry.lookup(&GameId::new("m1")).await.unwrap();
    assert_eq!(found.status, GameStatus::Running);
    assert_eq!(registry.phase(&GameId::new("m1")), Some(MatchPhase::Live));
}

#[tokio::test]
async fn unknown_match_everywhere() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(&store, true);
    let id = GameId::new("nope");

    assert!(matches!(
        registry.lookup(&id).await,
        Err(RelayError::UnknownMatch(_))
    ));
    assert!(matches!(
        registry.subscribe(&id).await,
        Err(RelayError::UnknownMatch(_))
    ));
    assert!(matches!(
        registry.append(&id, frame(0)).await,
        Err(RelayError::UnknownMatch(_))
    ));
}

#[tokio::test]
async fn unreachable_store_is_not_unknown() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(&store, true);
    store.fail_reads();

    let err = registry.lookup(&GameId::new("m9")).await.unwrap_err();
    assert!(matches!(err, RelayError::StoreUnavailable(_)));
}

#[tokio::test]
async fn malformed_archive_is_reported() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(&store, true);
    let id = GameId::new("m1");
    store.insert_raw(events_key(&id), "{oops");
    store.insert_raw(metadata_key(&id), "[1, 2");

    assert!(matches!(
        registry.subscribe(&id).await,
        Err(RelayError::MalformedRecord { .. })
    ));
    assert!(matches!(
        registry.lookup(&id).await,
        Err(RelayError::MalformedRecord { .. })
    ));
}

// =============================================================================
// Terminal-event idempotence
// =============================================================================

#[tokio::test]
async fn second_terminal_event_is_ignored_while_resident() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(&store, false);
    let id = GameId::new("m1");
    registry.register(game("m1")).unwrap();

    registry.append(&id, game_end()).await.unwrap();
    let again = registry.append(&id, game_end()).await.unwrap();
    let late_frame = registry.append(&id, frame(9)).await.unwrap();

    assert_eq!(again, AppendOutcome::Ignored);
    assert_eq!(late_frame, AppendOutcome::Ignored);
    assert_eq!(store.write_log().len(), 2);

    let history: Vec<_> = registry.subscribe(&id).await.unwrap().collect().await;
    assert_eq!(history, vec![game_end()]);
}

#[tokio::test]
async fn second_terminal_event_after_eviction_is_unknown() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(&store, true);
    let id = GameId::new("m1");
    registry.register(game("m1")).unwrap();

    registry.append(&id, game_end()).await.unwrap();
    let err = registry.append(&id, game_end()).await.unwrap_err();

    assert!(matches!(err, RelayError::UnknownMatch(_)));
    assert_eq!(store.write_log().len(), 2);
}

// =============================================================================
// Archive failure and retry
// =============================================================================

#[tokio::test]
async fn failed_metadata_write_is_retried_alone() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(&store, true);
    let id = GameId::new("m1");
    registry.register(game("m1")).unwrap();
    registry.append(&id, frame(0)).await.unwrap();

    store.fail_writes_matching(":metadata");
    let outcome = registry.append(&id, game_end()).await.unwrap();
    assert_eq!(outcome, AppendOutcome::ArchivePending { observers: 0 });
    assert_eq!(registry.phase(&id), Some(MatchPhase::ArchivePending));
    assert_eq!(store.write_log(), vec![events_key(&id)]);
    assert_eq!(registry.stats().pending_archives, 1);

    // Still served from memory meanwhile.
    let replay = registry.subscribe(&id).await.unwrap();
    assert_eq!(replay.source(), StreamSource::Memory);
    let replayed: Vec<_> = replay.collect().await;
    assert_eq!(replayed, vec![frame(0), game_end()]);
    assert_eq!(
        registry.lookup(&id).await.unwrap().status,
        GameStatus::Ended
    );

    // Store still down: nothing completes, events are not rewritten.
    assert_eq!(registry.retry_pending_archives().await, 0);
    assert_eq!(store.write_log(), vec![events_key(&id)]);

    store.heal();
    assert_eq!(registry.retry_pending_archives().await, 1);
    assert_eq!(store.write_log(), vec![events_key(&id), metadata_key(&id)]);
    assert_eq!(registry.phase(&id), None);
    assert_eq!(registry.retry_pending_archives().await, 0);
}

#[tokio::test]
async fn pending_match_ignores_further_events() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(&store, true);
    let id = GameId::new("m1");
    registry.register(game("m1")).unwrap();
    store.fail_writes_matching("game:m1");

    registry.append(&id, game_end()).await.unwrap();
    let again = registry.append(&id, game_end()).await.unwrap();

    assert_eq!(again, AppendOutcome::Ignored);
    assert!(store.write_log().is_empty());
}

#[tokio::test]
async fn archived_match_stays_resident_without_eviction() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(&store, false);
    let id = GameId::new("m1");
    registry.register(game("m1")).unwrap();
    registry.append(&id, game_end()).await.unwrap();

    assert_eq!(registry.phase(&id), Some(MatchPhase::Archived));
    let replay = registry.subscribe(&id).await.unwrap();
    assert_eq!(replay.source(), StreamSource::Memory);
    assert_eq!(registry.stats().resident, 1);
    assert_eq!(registry.stats().live, 0);
}

// =============================================================================
// Observers
// =============================================================================

#[tokio::test]
async fn slow_observer_is_disconnected_without_blocking_others() {
    let store = Arc::new(MemoryStore::new());
    let registry = GameRegistry::new(store.clone(), options(2, true));
    let id = GameId::new("m1");
    registry.register(game("m1")).unwrap();

    let mut slow = registry.subscribe(&id).await.unwrap();
    for turn in 0..3 {
        registry.append(&id, frame(turn)).await.unwrap();
    }
    assert_eq!(registry.observer_count(&id), Some(0));

    assert_eq!(slow.next().await, Some(frame(0)));
    assert_eq!(slow.next().await, Some(frame(1)));
    assert_eq!(slow.next().await, None);
    assert_eq!(slow.end(), StreamEnd::Lagged);

    // Resubscribing replays from the start.
    let fresh: Vec<_> = registry
        .subscribe(&id)
        .await
        .unwrap()
        .take(3)
        .collect()
        .await;
    assert_eq!(fresh, vec![frame(0), frame(1), frame(2)]);
}

#[tokio::test]
async fn dropping_a_stream_detaches_it() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(&store, true);
    let id = GameId::new("m1");
    registry.register(game("m1")).unwrap();

    let first = registry.subscribe(&id).await.unwrap();
    let _second = registry.subscribe(&id).await.unwrap();
    assert_eq!(registry.observer_count(&id), Some(2));

    drop(first);
    assert_eq!(registry.observer_count(&id), Some(1));
    assert_eq!(
        registry.append(&id, frame(0)).await.unwrap(),
        AppendOutcome::Delivered { observers: 1 }
    );
}

#[tokio::test]
async fn matches_are_isolated() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(&store, true);
    let one = GameId::new("m1");
    let two = GameId::new("m2");
    registry.register(game("m1")).unwrap();
    registry.register(game("m2")).unwrap();

    let watcher = registry.subscribe(&one).await.unwrap();
    registry.append(&two, frame(7)).await.unwrap();
    registry.append(&two, game_end()).await.unwrap();
    registry.append(&one, frame(0)).await.unwrap();
    registry.append(&one, game_end()).await.unwrap();

    let seen: Vec<_> = watcher.collect().await;
    assert_eq!(seen, vec![frame(0), game_end()]);
}

#[tokio::test]
async fn stats_track_phases_and_observers() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(&store, false);
    registry.register(game("m1")).unwrap();
    registry.register(game("m2")).unwrap();
    let _watcher = registry.subscribe(&GameId::new("m1")).await.unwrap();
    registry
        .append(&GameId::new("m2"), game_end())
        .await
        .unwrap();

    let stats = registry.stats();
    assert_eq!(stats.resident, 2);
    assert_eq!(stats.live, 1);
    assert_eq!(stats.pending_archives, 0);
    assert_eq!(stats.observers, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn observers_attaching_mid_match_never_miss_or_repeat() {
    const TURNS: u32 = 200;

    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(GameRegistry::new(store.clone(), options(512, true)));
    let id = GameId::new("race");
    registry.register(game("race")).unwrap();

    let appender = {
        let registry = Arc::clone(&registry);
        let id = id.clone();
        tokio::spawn(async move {
            for turn in 0..TURNS {
                registry.append(&id, frame(turn)).await.unwrap();
                if turn % 16 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            registry.append(&id, game_end()).await.unwrap();
        })
    };

    let mut watchers = Vec::new();
    for _ in 0..8 {
        let registry = Arc::clone(&registry);
        let id = id.clone();
        watchers.push(tokio::spawn(async move {
            tokio::task::yield_now().await;
            let stream = registry.subscribe(&id).await.unwrap();
            stream.collect::<Vec<_>>().await
        }));
    }

    appender.await.unwrap();

    let mut expected: Vec<_> = (0..TURNS).map(frame).collect();
    expected.push(game_end());
    for watcher in watchers {
        assert_eq!(watcher.await.unwrap(), expected);
    }
}
