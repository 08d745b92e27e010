//! `Dragonfly` (Redis-compatible) backend.
//!
//! Archived records are plain string values written with `SET` and read
//! with `GET`. No expiry is set; archived matches stay retrievable until
//! removed out of band.

use async_trait::async_trait;
use fred::prelude::*;

use crate::DurableStore;
use crate::error::StoreError;

/// Connection handle to a `Dragonfly` (Redis-compatible) instance.
#[derive(Clone)]
pub struct DragonflyStore {
    client: Client,
}

impl DragonflyStore {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the URL cannot be parsed.
    /// Returns [`StoreError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let config = Config::from_url(url)
            .map_err(|e| StoreError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }
}

#[async_trait]
impl DurableStore for DragonflyStore {
    async fn get(&self, key: &str) -> Result<String, StoreError> {
        let value: Option<String> = self.client.get(key).await?;
        value.ok_or_else(|| StoreError::KeyNotFound(key.to_owned()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _: () = self.client.set(key, value, None, None, false).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "dragonfly"
    }
}
