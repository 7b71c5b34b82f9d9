//! Encryption layer for Keepsake migration.
//!
//! Provides:
//! - SHA-256 key derivation from the migration passphrase and backup id
//! - ChaCha20-Poly1305 sealing of whole artifacts into self-describing blobs
//! - The media key hierarchy (master key → per-file HKDF keys)
//! - An ordered chain of media decoding strategies for files written by
//!   older builds
//!
//! # Sealed blob format
//!
//! ```text
//! [ nonce (12 bytes) | ciphertext | tag (16 bytes) ]
//! ```
//!
//! The nonce is random per seal and travels with the ciphertext, so storage
//! and transport never track it separately. `open` reports every failure as
//! `CryptoError::AuthenticationFailure`: a wrong passphrase and a corrupted
//! transfer are indistinguishable.

mod cipher;
mod error;
mod key;
pub mod media;

pub use cipher::{NONCE_SIZE, TAG_SIZE, open, open_file, seal, seal_file};
pub use error::{CryptoError, CryptoResult};
pub use key::{KEY_SIZE, MigrationKey, derive_key};
pub use media::{
    MasterKey, MediaContext, MediaDecoder, MediaKey, TryDecode, encrypt_media_chunked, key_id_for,
};
