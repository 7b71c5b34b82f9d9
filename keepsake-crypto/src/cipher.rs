//! ChaCha20-Poly1305 sealing of whole artifacts.

use crate::error::{CryptoError, CryptoResult};
use crate::key::MigrationKey;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Nonce size for ChaCha20-Poly1305.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag size.
pub const TAG_SIZE: usize = 16;

/// Encrypts `plaintext` into a self-describing `nonce | ciphertext | tag` blob.
pub fn seal(plaintext: &[u8], key: &MigrationKey) -> CryptoResult<Vec<u8>> {
    seal_raw(key.as_bytes(), plaintext)
}

/// Decrypts a blob produced by [`seal`].
///
/// Truncation, tampering and a wrong key all yield
/// [`CryptoError::AuthenticationFailure`].
pub fn open(sealed: &[u8], key: &MigrationKey) -> CryptoResult<Vec<u8>> {
    open_raw(key.as_bytes(), sealed)
}

/// Seals `plaintext` and writes it to `path` via a temp file in the same
/// directory followed by a rename.
pub fn seal_file(path: &Path, plaintext: &[u8], key: &MigrationKey) -> CryptoResult<()> {
    let sealed = seal(plaintext, key)?;
    write_atomic(path, &sealed)?;
    debug!("sealed {} bytes into {}", plaintext.len(), path.display());
    Ok(())
}

/// Reads and opens a file written by [`seal_file`].
pub fn open_file(path: &Path, key: &MigrationKey) -> CryptoResult<Vec<u8>> {
    let sealed = std::fs::read(path)?;
    open(&sealed, key)
}

pub(crate) fn seal_raw(key: &[u8; 32], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    seal_with_aad(key, plaintext, &[])
}

pub(crate) fn open_raw(key: &[u8; 32], sealed: &[u8]) -> CryptoResult<Vec<u8>> {
    open_with_aad(key, sealed, &[])
}

pub(crate) fn seal_with_aad(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(
            &nonce,
            chacha20poly1305::aead::Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

pub(crate) fn open_with_aad(key: &[u8; 32], sealed: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::AuthenticationFailure);
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            chacha20poly1305::aead::Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::AuthenticationFailure)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_len_is_nonce_plus_tag_plus_plaintext() {
        let key = MigrationKey::from_bytes([3u8; 32]);
        let sealed = seal(b"hello", &key).unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + 5 + TAG_SIZE);
    }

    #[test]
    fn aad_mismatch_fails() {
        let key = [9u8; 32];
        let sealed = seal_with_aad(&key, b"frame", b"\x00").unwrap();
        assert!(open_with_aad(&key, &sealed, b"\x01").is_err());
        assert_eq!(open_with_aad(&key, &sealed, b"\x00").unwrap(), b"frame");
    }
}
