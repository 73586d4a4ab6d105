use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;

/// A tenant-scoped collection of named binary blobs.
///
/// State entries and lock records both live here; a lock record is simply the
/// entry named `{name}-lock`. Implementations must report a missing entry as
/// [`StoreError::NotFound`] so callers can tell "absent" from other failures.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the backend identifier (e.g., "vault", "memory").
    fn backend_name(&self) -> &'static str;

    /// Create or overwrite the blob stored under `name`.
    async fn set_bin(&self, name: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Read the blob stored under `name`.
    async fn get_bin(&self, name: &str) -> Result<Vec<u8>, StoreError>;

    /// Remove the blob stored under `name`.
    async fn delete(&self, name: &str) -> Result<(), StoreError>;
}

/// Store shared between the pool and in-flight requests.
pub type SharedStore = Arc<dyn Store>;
