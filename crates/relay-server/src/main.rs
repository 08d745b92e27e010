//! Arena Relay binary.
//!
//! Wires the match registry to its durable store, the observer API, and
//! the NATS ingest loop, then runs until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `relay-config.yaml` (or `$RELAY_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Connect the durable store
//! 4. Create the game registry
//! 5. Start the Observer API server
//! 6. Connect to NATS and start ingestion (if enabled)
//! 7. Start the archive retry sweep
//! 8. Wait for `Ctrl-C`, then drain and make a last archive attempt

mod error;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use relay_core::config::{LoggingConfig, StorageBackend, StorageConfig};
use relay_core::{GameRegistry, RegistryOptions, RelayConfig};
use relay_ingest::{Dispatcher, NatsIngest};
use relay_observer::AppState;
use relay_observer::startup::spawn_observer;
use relay_store::{DragonflyStore, DurableStore, MemoryStore};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Default configuration file, relative to the working directory.
const CONFIG_FILE: &str = "relay-config.yaml";

/// Application entry point for the relay.
///
/// # Errors
///
/// Returns an error if any initialization step fails.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("relay-server starting");
    info!(
        port = config.server.port,
        backend = ?config.storage.backend,
        ingest = config.ingest.enabled,
        queue_capacity = config.registry.observer_queue_capacity,
        evict_on_archive = config.registry.evict_on_archive,
        "Configuration loaded"
    );

    // 3. Connect the durable store.
    let store = connect_store(&config.storage).await?;

    // 4. Create the registry.
    let registry = Arc::new(GameRegistry::new(
        store,
        RegistryOptions::from_config(&config.registry, &config.archive),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 5. Start Observer API server.
    let app_state = Arc::new(AppState::new(Arc::clone(&registry)));
    let observer = spawn_observer(
        &config.server,
        app_state,
        wait_for_shutdown(shutdown_rx.clone()),
    )
    .await?;

    // 6. Start NATS ingestion.
    let ingest = if config.ingest.enabled {
        let nats = NatsIngest::connect(&config.ingest.nats_url).await?;
        let subscriber = nats.subscribe(&config.ingest.subject_prefix).await?;
        let dispatcher = Dispatcher::new(Arc::clone(&registry), config.ingest.subject_prefix.clone());
        let handle = tokio::spawn(relay_ingest::run(
            subscriber,
            dispatcher,
            wait_for_shutdown(shutdown_rx.clone()),
        ));
        Some((nats, handle))
    } else {
        info!("NATS ingestion disabled");
        None
    };

    // 7. Start the archive retry sweep.
    let sweeper = tokio::spawn(retry_sweep(
        Arc::clone(&registry),
        config.archive.retry_interval(),
        shutdown_rx,
    ));

    // 8. Run until interrupted.
    tokio::signal::ctrl_c()
        .await
        .map_err(|source| AppError::Signal { source })?;
    info!("Shutdown signal received");

    if shutdown_tx.send(true).is_err() {
        debug!("No tasks left to notify of shutdown");
    }

    if let Some((nats, handle)) = ingest {
        if let Err(e) = handle.await {
            warn!(error = %e, "Ingest task failed");
        }
        drop(nats);
    }
    if let Err(e) = sweeper.await {
        warn!(error = %e, "Retry sweep task failed");
    }
    if let Err(e) = observer.await {
        warn!(error = %e, "Observer task failed");
    }

    let archived = registry.retry_pending_archives().await;
    let stats = registry.stats();
    if stats.pending_archives > 0 {
        warn!(
            pending = stats.pending_archives,
            "Exiting with unarchived games"
        );
    }
    info!(archived, live = stats.live, "relay-server stopped");
    Ok(())
}

/// Load configuration, falling back to defaults plus environment
/// overrides when no file is present.
fn load_config() -> Result<RelayConfig, AppError> {
    let path = std::env::var_os("RELAY_CONFIG").map_or_else(|| PathBuf::from(CONFIG_FILE), PathBuf::from);
    if path.exists() {
        Ok(RelayConfig::from_file(&path)?)
    } else {
        let mut config = RelayConfig::default();
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Open the configured durable store.
async fn connect_store(config: &StorageConfig) -> Result<Arc<dyn DurableStore>, AppError> {
    match config.backend {
        StorageBackend::Dragonfly => {
            let store = DragonflyStore::connect(&config.dragonfly_url).await?;
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory store, archives will not survive a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Resolve once shutdown has been signalled, or the sender is gone.
async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Periodically retry archives left pending by store failures.
async fn retry_sweep(registry: Arc<GameRegistry>, every: Duration, shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; nothing can be pending yet.
    ticker.tick().await;

    let stop = wait_for_shutdown(shutdown);
    tokio::pin!(stop);

    loop {
        tokio::select! {
            () = &mut stop => break,
            _ = ticker.tick() => {
                let completed = registry.retry_pending_archives().await;
                if completed > 0 {
                    info!(completed, "Pending archives written");
                }
            }
        }
    }
    debug!("Retry sweep stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use relay_core::{ArchivePolicy, MatchPhase};
    use relay_types::{Game, GameEvent, GameId, Ruleset};

    use super::*;

    #[tokio::test]
    async fn shutdown_wait_resolves_on_signal() {
        let (tx, rx) = watch::channel(false);
        let waiter = tokio::spawn(wait_for_shutdown(rx));
        tx.send(true).unwrap();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_wait_resolves_when_sender_dropped() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        wait_for_shutdown(rx).await;
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_retries_pending_archives() {
        let store = Arc::new(MemoryStore::new());
        let options = RegistryOptions {
            archive: ArchivePolicy {
                max_attempts: 1,
                initial_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
            },
            ..RegistryOptions::default()
        };
        let registry = Arc::new(GameRegistry::new(store.clone(), options));
        let id = GameId::new("m1");
        registry
            .register(Game::new("m1", 11, 11, Ruleset::default()))
            .unwrap();

        store.fail_writes_matching("game:m1");
        registry
            .append(&id, GameEvent::game_end(serde_json::Value::Null))
            .await
            .unwrap();
        assert_eq!(registry.phase(&id), Some(MatchPhase::ArchivePending));
        store.heal();

        let (tx, rx) = watch::channel(false);
        let sweep = tokio::spawn(retry_sweep(
            Arc::clone(&registry),
            Duration::from_secs(30),
            rx,
        ));
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(registry.phase(&id), None);
        assert_eq!(store.write_log().len(), 2);
        tx.send(true).unwrap();
        sweep.await.unwrap();
    }
}
