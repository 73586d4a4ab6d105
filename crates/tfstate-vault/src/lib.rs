//! HashiCorp Vault store for the Terraform state backend.
//!
//! Each tenant gets a [`VaultSession`] authenticated with its own credential
//! (a static token or an AppRole pair). Blobs are compressed and
//! base64-encoded before being written to a KV v2 mount.

pub mod codec;
mod config;
mod credential;
mod session;
mod token;

pub use codec::CodecError;
pub use config::VaultConfig;
pub use credential::Credential;
pub use session::{VaultSession, VaultSessionFactory};
pub use token::{Grant, TokenState};
