//! Error types for storage field types

use thiserror::Error;

/// Result type for storage field operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised while parsing storage values.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Object id text was not 24 hex characters
    #[error("invalid object id '{input}': {reason}")]
    InvalidObjectId { input: String, reason: String },

    /// Error from the document layer
    #[error(transparent)]
    Document(#[from] swissarmyhammer_documents::DocumentError),
}
