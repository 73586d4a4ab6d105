use thiserror::Error;

/// Errors that can occur in the store layer.
///
/// `Clone` so a failed session construction can be handed to every caller
/// waiting on the same credential.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Classified failure reported by the backing store, passed through as-is.
    #[error("{message}")]
    Backend { status: u16, message: String },

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
