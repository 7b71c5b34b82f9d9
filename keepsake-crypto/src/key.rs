//! Migration key derivation.

use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Symmetric key size in bytes.
pub const KEY_SIZE: usize = 32;

/// A 256-bit key derived for one backup artifact.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MigrationKey([u8; KEY_SIZE]);

impl MigrationKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for MigrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MigrationKey([REDACTED])")
    }
}

/// Derives the artifact key: `SHA-256(passphrase_utf8 || backup_id_bytes)`.
///
/// Deterministic and stateless; the backup id acts as the salt, so the same
/// passphrase yields a different key for every export.
pub fn derive_key(passphrase: &str, backup_id: &Uuid) -> MigrationKey {
    let mut hasher = Sha256::new();
    hasher.update(passphrase.as_bytes());
    hasher.update(backup_id.as_bytes());
    MigrationKey(hasher.finalize().into())
}
