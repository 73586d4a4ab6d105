//! The Terraform HTTP backend locking protocol.
//!
//! Four verbs operate on one tenant's store:
//! - load: read the state entry
//! - store: overwrite the state entry, if the caller holds the lock
//! - lock: create the `{name}-lock` record if there is none
//! - unlock: delete the lock record, if the caller holds it
//!
//! Locking is advisory. The lock check and the write that follows it are two
//! separate backing-store calls, so two concurrent stores for the same name
//! can interleave between them. Nothing here makes that atomic.

use bytes::Bytes;
use serde::de::IgnoredAny;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::error::StoreError;
use crate::lock::{lock_name, LockCheck, LockRecord};
use crate::pool::SharedStorePool;
use crate::store::{SharedStore, Store};
use crate::tenant::fingerprint;

/// Operation requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Load,
    Store,
    Lock,
    Unlock,
}

/// A decoded protocol request.
#[derive(Debug, Clone)]
pub struct StateRequest {
    pub verb: Verb,
    /// State name, e.g. `sample` or `env/prod`.
    pub name: String,
    /// Opaque tenant credential, used as the pool key.
    pub credential: String,
    pub body: Bytes,
    /// Lock ID supplied with a store (`?ID=`).
    pub lock_id: Option<String>,
}

/// Successful protocol response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub body: Bytes,
}

impl Reply {
    fn empty() -> Self {
        Self::default()
    }

    fn with_body(body: impl Into<Bytes>) -> Self {
        Self { body: body.into() }
    }

    /// Whether the body is a JSON document.
    pub fn is_json(&self) -> bool {
        !self.body.is_empty() && serde_json::from_slice::<IgnoredAny>(&self.body).is_ok()
    }
}

/// Protocol-level failures, one variant per response status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("State not found")]
    NotFound,

    #[error("No lock record to validate against")]
    NoLock,

    /// Store blocked by a lock held by someone else; carries the lock record.
    #[error("State is locked")]
    Locked(Bytes),

    /// Lock or unlock blocked by an existing lock; carries the lock record.
    #[error("Lock conflict")]
    Conflict(Bytes),

    #[error("Stored lock record is malformed: {0}")]
    MalformedLock(String),

    #[error("{message}")]
    Backend { status: u16, message: String },

    #[error("Backing store unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProtocolError {
    pub fn status_code(&self) -> u16 {
        match self {
            ProtocolError::Unauthorized => 401,
            ProtocolError::BadRequest(_) => 400,
            ProtocolError::NotFound => 404,
            ProtocolError::NoLock => 422,
            ProtocolError::Locked(_) => 423,
            ProtocolError::Conflict(_) => 409,
            ProtocolError::MalformedLock(_) => 500,
            ProtocolError::Backend { status, .. } => *status,
            ProtocolError::Unavailable(_) => 503,
            ProtocolError::Internal(_) => 500,
        }
    }

    /// The lock record to echo back, for locked and conflict responses.
    pub fn lock_record(&self) -> Option<&Bytes> {
        match self {
            ProtocolError::Locked(record) | ProtocolError::Conflict(record) => Some(record),
            _ => None,
        }
    }
}

/// Map a store failure to a protocol error. Called once per failed operation.
fn classify(err: StoreError, action: &str) -> ProtocolError {
    match err {
        StoreError::NotFound(_) => ProtocolError::NotFound,
        StoreError::Backend { status, message } => {
            debug!("Backing store refused to {}: {} - {}", action, status, message);
            ProtocolError::Backend { status, message }
        }
        other => {
            error!("Unable to {}: {}", action, other);
            ProtocolError::Internal(other.to_string())
        }
    }
}

/// Executes protocol verbs against the pooled tenant stores.
pub struct LockProtocol {
    pool: SharedStorePool,
    evict_on_unlock: bool,
}

impl LockProtocol {
    /// Create a handler over `pool`. Sessions are evicted after a successful unlock.
    pub fn new(pool: SharedStorePool) -> Self {
        Self {
            pool,
            evict_on_unlock: true,
        }
    }

    /// Whether a successful unlock drops the tenant's pooled session, forcing
    /// re-authentication on its next request.
    pub fn with_evict_on_unlock(mut self, evict: bool) -> Self {
        self.evict_on_unlock = evict;
        self
    }

    pub fn pool(&self) -> &SharedStorePool {
        &self.pool
    }

    /// Handle one request end to end.
    #[instrument(
        skip_all,
        fields(verb = ?request.verb, state = %request.name, tenant = %fingerprint(&request.credential))
    )]
    pub async fn handle(&self, request: StateRequest) -> Result<Reply, ProtocolError> {
        let store = self.resolve(&request.credential).await?;
        let store = store.as_ref();

        match request.verb {
            Verb::Load => self.load(store, &request.name).await,
            Verb::Store => {
                self.store(store, &request.name, request.lock_id.as_deref(), &request.body)
                    .await
            }
            Verb::Lock => self.lock(store, &request.name, &request.body).await,
            Verb::Unlock => {
                self.unlock(store, &request.name, &request.credential, &request.body)
                    .await
            }
        }
    }

    /// Get the tenant's store from the pool.
    async fn resolve(&self, credential: &str) -> Result<SharedStore, ProtocolError> {
        if credential.is_empty() {
            return Err(ProtocolError::Unauthorized);
        }

        self.pool.get(credential).await.map_err(|e| match e {
            StoreError::InvalidCredential(reason) => {
                debug!("Rejected credential: {}", reason);
                ProtocolError::Unauthorized
            }
            StoreError::Backend { status, message } => {
                debug!("Error connecting to backing store: {} - {}", status, message);
                ProtocolError::Backend { status, message }
            }
            other => {
                error!("Error connecting to backing store: {}", other);
                ProtocolError::Unavailable(other.to_string())
            }
        })
    }

    /// Read the state entry.
    pub async fn load(&self, store: &dyn Store, state: &str) -> Result<Reply, ProtocolError> {
        debug!("Load state");

        let data = store
            .get_bin(state)
            .await
            .map_err(|e| classify(e, "get state"))?;

        Ok(Reply::with_body(data))
    }

    /// Overwrite the state entry if `lock_id` matches the current lock.
    pub async fn store(
        &self,
        store: &dyn Store,
        state: &str,
        lock_id: Option<&str>,
        body: &[u8],
    ) -> Result<Reply, ProtocolError> {
        debug!("Store state");

        match self.check_lock(store, state, lock_id).await? {
            LockCheck::Proceed => {}
            LockCheck::Blocked(record) => return Err(ProtocolError::Locked(record.into_raw())),
            LockCheck::Unlocked => return Err(ProtocolError::NoLock),
        }

        store
            .set_bin(state, body)
            .await
            .map_err(|e| classify(e, "store state"))?;

        Ok(Reply::empty())
    }

    /// Create the lock record from `body` unless one already exists.
    pub async fn lock(
        &self,
        store: &dyn Store,
        state: &str,
        body: &[u8],
    ) -> Result<Reply, ProtocolError> {
        debug!("Lock state");

        let name = lock_name(state);
        match store.get_bin(&name).await {
            Ok(existing) => Err(ProtocolError::Conflict(existing.into())),
            Err(StoreError::NotFound(_)) => {
                store
                    .set_bin(&name, body)
                    .await
                    .map_err(|e| classify(e, "store lock"))?;
                info!("State locked");
                Ok(Reply::empty())
            }
            Err(e) => Err(classify(e, "retrieve lock")),
        }
    }

    /// Delete the lock record if the `ID` in `body` matches it.
    pub async fn unlock(
        &self,
        store: &dyn Store,
        state: &str,
        credential: &str,
        body: &[u8],
    ) -> Result<Reply, ProtocolError> {
        debug!("Unlock state");

        let request = LockRecord::parse_request(Bytes::copy_from_slice(body))
            .map_err(|e| ProtocolError::BadRequest(e.to_string()))?;

        match self.check_lock(store, state, request.id()).await? {
            LockCheck::Proceed => {}
            LockCheck::Blocked(record) => return Err(ProtocolError::Conflict(record.into_raw())),
            LockCheck::Unlocked => return Err(ProtocolError::NoLock),
        }

        store.delete(&lock_name(state)).await.map_err(|e| match e {
            // Released concurrently between the check and the delete
            StoreError::NotFound(_) => ProtocolError::NoLock,
            other => classify(other, "remove lock"),
        })?;
        info!("State unlocked");

        if self.evict_on_unlock {
            self.pool.delete(credential).await;
        }

        Ok(Reply::empty())
    }

    /// Compare `supplied` with the `ID` of the lock record guarding `state`.
    pub async fn check_lock(
        &self,
        store: &dyn Store,
        state: &str,
        supplied: Option<&str>,
    ) -> Result<LockCheck, ProtocolError> {
        let raw = match store.get_bin(&lock_name(state)).await {
            Ok(raw) => raw,
            Err(StoreError::NotFound(_)) => return Ok(LockCheck::Unlocked),
            Err(e) => return Err(classify(e, "check lock")),
        };

        let record = LockRecord::parse(raw).map_err(|e| {
            error!("Unable to check lock: {}", e);
            ProtocolError::MalformedLock(e.to_string())
        })?;

        if record.is_held_by(supplied) {
            Ok(LockCheck::Proceed)
        } else {
            debug!(held_by = ?record.id(), "Lock held by another client");
            Ok(LockCheck::Blocked(record))
        }
    }
}
