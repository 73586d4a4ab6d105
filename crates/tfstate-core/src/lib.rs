//! Core traits and types for the Vault-backed Terraform state backend.
//!
//! This crate defines the pieces shared between the backing-store
//! implementations and the HTTP server:
//! - `Store`: named binary blobs (state entries and lock records)
//! - `SessionPool`: one authenticated `Store` per tenant credential
//! - `LockProtocol`: the load / store / lock / unlock verbs

mod error;
mod lock;
mod memory;
mod pool;
mod protocol;
mod store;
mod tenant;

pub use error::StoreError;
pub use lock::{lock_name, LockCheck, LockRecord, LockRecordError};
pub use memory::{MemoryStore, MemoryStoreFactory};
pub use pool::{SessionFactory, SessionPool, SharedStorePool, StorePool};
pub use protocol::{LockProtocol, ProtocolError, Reply, StateRequest, Verb};
pub use store::{SharedStore, Store};
pub use tenant::fingerprint;
