use std::sync::Arc;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::SharedStore;
use crate::tenant::fingerprint;

/// Builds an authenticated [`Store`](crate::Store) for a tenant credential.
///
/// Construction must not have side effects on the backing store: a failed
/// construction is simply dropped and nothing is cached.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    async fn create(&self, credential: &str) -> Result<SharedStore, StoreError>;
}

/// Collection of per-tenant stores.
///
/// `get` creates the store for an unknown credential on first use.
/// Deleting an unknown credential has no effect.
#[async_trait]
pub trait StorePool: Send + Sync {
    async fn get(&self, credential: &str) -> Result<SharedStore, StoreError>;

    async fn delete(&self, credential: &str);

    /// Number of pooled sessions.
    async fn session_count(&self) -> u64;
}

/// Shared pool wrapped in Arc.
pub type SharedStorePool = Arc<dyn StorePool>;

/// Pool of backing-store sessions keyed by tenant credential.
///
/// Get-or-create is single-flight per credential: concurrent first calls for
/// the same credential await one construction and all receive the same
/// session. Calls for different credentials do not wait on each other.
/// Sessions stay pooled until deleted; there is no idle expiry.
pub struct SessionPool<F> {
    factory: F,
    sessions: Cache<String, SharedStore>,
}

impl<F: SessionFactory> SessionPool<F> {
    /// Create a new pool building sessions with `factory`.
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            sessions: Cache::builder().build(),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }
}

#[async_trait]
impl<F: SessionFactory> StorePool for SessionPool<F> {
    async fn get(&self, credential: &str) -> Result<SharedStore, StoreError> {
        let init = async {
            debug!(tenant = %fingerprint(credential), "Creating a new backing-store session");
            self.factory.create(credential).await
        };

        self.sessions
            .try_get_with(credential.to_string(), init)
            .await
            .map_err(|e| {
                warn!(tenant = %fingerprint(credential), "Session creation failed: {}", e);
                Arc::unwrap_or_clone(e)
            })
    }

    async fn delete(&self, credential: &str) {
        debug!(tenant = %fingerprint(credential), "Evicting backing-store session");
        self.sessions.invalidate(credential).await;
    }

    async fn session_count(&self) -> u64 {
        self.sessions.run_pending_tasks().await;
        self.sessions.entry_count()
    }
}
