//! NATS subscription feeding the [`Dispatcher`].
//!
//! The match engine publishes on subjects under a configurable prefix (see
//! [`subject`](crate::subject)). A single wildcard subscription keeps
//! registrations and events in publish order.

use std::future::Future;

use futures::StreamExt as _;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::IngestError;
use crate::subject;

/// NATS client wrapper for match ingestion.
pub struct NatsIngest {
    client: async_nats::Client,
}

impl NatsIngest {
    /// Connect to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Nats`] if the connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, IngestError> {
        info!(url = url, "connecting to NATS server");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| IngestError::Nats(format!("failed to connect to {url}: {e}")))?;
        info!("NATS connection established");
        Ok(Self { client })
    }

    /// Subscribe to every subject under `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Nats`] if the subscription fails.
    pub async fn subscribe(&self, prefix: &str) -> Result<async_nats::Subscriber, IngestError> {
        let wildcard = subject::wildcard(prefix);
        debug!(subject = wildcard, "subscribing to match subjects");
        let subscriber = self
            .client
            .subscribe(wildcard.clone())
            .await
            .map_err(|e| IngestError::Nats(format!("failed to subscribe to {wildcard}: {e}")))?;
        info!(subject = wildcard, "subscribed to match subjects");
        Ok(subscriber)
    }

    /// The underlying client, for publishing.
    pub const fn client(&self) -> &async_nats::Client {
        &self.client
    }
}

impl core::fmt::Debug for NatsIngest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NatsIngest")
            .field("state", &self.client.connection_state())
            .finish()
    }
}

/// Feed `subscriber` into `dispatcher` until the subscription ends or
/// `shutdown` resolves, then drain the per-match workers.
///
/// Messages that fail to route are logged and skipped.
pub async fn run<F>(mut subscriber: async_nats::Subscriber, mut dispatcher: Dispatcher, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Ingest shutting down");
                break;
            }
            message = subscriber.next() => {
                let Some(message) = message else {
                    warn!("NATS subscription closed");
                    break;
                };
                if let Err(e) = dispatcher.dispatch(&message.subject, &message.payload).await {
                    warn!(subject = %message.subject, error = %e, "Skipping ingest message");
                }
            }
        }
    }

    if let Err(e) = subscriber.unsubscribe().await {
        debug!(error = %e, "Unsubscribe failed");
    }
    dispatcher.shutdown().await;
}
