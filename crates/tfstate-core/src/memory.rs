use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::error::StoreError;
use crate::pool::SessionFactory;
use crate::store::{SharedStore, Store};

type Entries = Arc<DashMap<String, Vec<u8>>>;

/// In-memory [`Store`].
///
/// Used as the test double for the lock protocol and as the `memory`
/// backend for running the server without Vault.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Entries,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries(entries: Entries) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn set_bin(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        self.entries.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn get_bin(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        self.entries
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.entries
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }
}

/// Builds [`MemoryStore`] sessions.
///
/// Each credential gets its own entry space which outlives the sessions built
/// on it, the way data in a real backing store outlives a client: evicting a
/// session from the pool and creating a new one sees the same entries.
#[derive(Debug, Default)]
pub struct MemoryStoreFactory {
    tenants: DashMap<String, Entries>,
    created: AtomicUsize,
}

impl MemoryStoreFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions built so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for MemoryStoreFactory {
    async fn create(&self, credential: &str) -> Result<SharedStore, StoreError> {
        if credential.is_empty() {
            return Err(StoreError::InvalidCredential(
                "empty credential".to_string(),
            ));
        }

        let entries = self
            .tenants
            .entry(credential.to_string())
            .or_default()
            .value()
            .clone();
        self.created.fetch_add(1, Ordering::SeqCst);
        debug!("Created in-memory session ({} entries)", entries.len());

        Ok(Arc::new(MemoryStore::with_entries(entries)))
    }
}
