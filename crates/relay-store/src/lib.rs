//! Durable storage for archived matches.
//!
//! The relay only needs two operations from its store: read a record by
//! key and overwrite a record by key. There are no transactions and no
//! versioning; the two records written per archived match are independent.
//!
//! ```text
//! GameRegistry --(terminal event)--> DurableStore::set("game:{id}:events")
//!                                    DurableStore::set("game:{id}:metadata")
//! GameRegistry <--(late observer)--- DurableStore::get(...)
//! ```
//!
//! # Modules
//!
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) backend
//! - [`memory`] -- In-process backend for local runs and tests
//! - [`keys`] -- Key derivation from match identifiers
//! - [`error`] -- Shared error types

pub mod dragonfly;
pub mod error;
pub mod keys;
pub mod memory;

use async_trait::async_trait;

// Re-export primary types for convenience.
pub use dragonfly::DragonflyStore;
pub use error::StoreError;
pub use memory::MemoryStore;

/// A key/value store holding archived match records.
///
/// Values are UTF-8 JSON documents. Implementations must be safe to share
/// across tasks.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Read the record stored at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::KeyNotFound`] if nothing is stored at `key`,
    /// or a backend error if the store cannot be reached.
    async fn get(&self, key: &str) -> Result<String, StoreError>;

    /// Store `value` at `key`, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the write does not succeed.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}
