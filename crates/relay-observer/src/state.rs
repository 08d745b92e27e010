//! Shared application state for the Observer API server.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use relay_core::GameRegistry;

/// State shared by every handler.
#[derive(Debug)]
pub struct AppState {
    /// The match registry.
    pub registry: Arc<GameRegistry>,
    /// When this server process started.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wrap a registry, stamping the start time.
    pub fn new(registry: Arc<GameRegistry>) -> Self {
        Self {
            registry,
            started_at: Utc::now(),
        }
    }
}
