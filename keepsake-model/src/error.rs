//! Persistence-engine errors and the shared error taxonomy.

use thiserror::Error;

/// Result type for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by a `RecordStore` implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("record store backend error: {0}")]
    Backend(String),

    #[error("record store lock poisoned")]
    Poisoned,
}

/// Coarse classification shared by every migration-facing error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The artifact or container is malformed or from an unknown schema.
    Format,
    /// Authentication failed: wrong passphrase or corrupted data.
    Crypto,
    Io,
    /// The pairing peer misbehaved or went away.
    Protocol,
    Store,
}
