//! In-process store.
//!
//! Backs `storage.backend: memory` for local runs where no `Dragonfly`
//! instance is available. Records live only as long as the process.
//!
//! Write and read faults can be injected so the archival failure paths of
//! the registry can be exercised without a real outage.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::DurableStore;
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Faults {
    /// Writes to keys containing any of these fragments fail.
    failing_writes: Vec<String>,
    /// Every read fails.
    failing_reads: bool,
}

/// A [`DurableStore`] backed by a hash map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<String>>,
    faults: Mutex<Faults>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write to a key containing `fragment` fail until
    /// [`heal`](Self::heal) is called.
    pub fn fail_writes_matching(&self, fragment: impl Into<String>) {
        self.faults.lock().failing_writes.push(fragment.into());
    }

    /// Make every read fail until [`heal`](Self::heal) is called.
    pub fn fail_reads(&self) {
        self.faults.lock().failing_reads = true;
    }

    /// Clear all injected faults.
    pub fn heal(&self) {
        *self.faults.lock() = Faults::default();
    }

    /// Keys of every successful write, in write order.
    pub fn write_log(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    /// Store a raw record directly, bypassing the write log.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.records.lock().insert(key.into(), value.into());
    }

    /// Whether a record exists at `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.records.lock().contains_key(key)
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<String, StoreError> {
        if self.faults.lock().failing_reads {
            return Err(StoreError::Unavailable(format!("read of {key} refused")));
        }
        self.records
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::KeyNotFound(key.to_owned()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let refused = self
            .faults
            .lock()
            .failing_writes
            .iter()
            .any(|fragment| key.contains(fragment.as_str()));
        if refused {
            return Err(StoreError::Unavailable(format!("write of {key} refused")));
        }
        self.records.lock().insert(key.to_owned(), value.to_owned());
        self.writes.lock().push(key.to_owned());
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
