use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Tampered data, wrong key or truncated blob. Deliberately carries no
    /// detail about which.
    #[error("authentication failed (wrong passphrase or corrupted data)")]
    AuthenticationFailure,

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
