//! Media key hierarchy and decoding strategies.
//!
//! Media files on disk were written by several generations of the app:
//! plain files, whole-file sealed blobs, and the current chunked stream
//! format. [`MediaDecoder`] tries each known layout in order and returns the
//! first one that authenticates.
//!
//! Keys: one [`MasterKey`] per installation, kept in the credential store;
//! every file gets its own [`MediaKey`] from
//! `HKDF-SHA256(ikm = master, salt = key id, info = "")`, where the key id is
//! the file stem.

use crate::cipher::{open_raw, open_with_aad, seal_raw, seal_with_aad};
use crate::error::{CryptoError, CryptoResult};
use crate::key::KEY_SIZE;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use std::path::Path;
use tracing::trace;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Version tag opening a chunked media stream.
pub const CHUNKED_VERSION: u8 = 0x01;

/// Plaintext bytes per frame written by [`encrypt_media_chunked`].
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Installation-wide media master key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_SIZE]);

impl MasterKey {
    /// Generates a fresh key from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Derives the key for one media file.
    pub fn file_key(&self, key_id: &str) -> CryptoResult<MediaKey> {
        let hk = Hkdf::<Sha256>::new(Some(key_id.as_bytes()), &self.0);
        let mut okm = [0u8; KEY_SIZE];
        hk.expand(&[], &mut okm)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        Ok(MediaKey(okm))
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// Per-file media key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MediaKey([u8; KEY_SIZE]);

impl MediaKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MediaKey([REDACTED])")
    }
}

/// Key id for a media file: its stem (`IMG_0001.heic` → `IMG_0001`).
pub fn key_id_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ── Signatures ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Jpeg,
    Png,
    Gif,
    /// ISO base media (HEIC, MP4, MOV): `ftyp` box at offset 4.
    IsoBmff,
}

/// Recognises the container signature of unencrypted media.
pub fn sniff_media_kind(data: &[u8]) -> Option<MediaKind> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(MediaKind::Jpeg)
    } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(MediaKind::Png)
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some(MediaKind::Gif)
    } else if data.len() >= 8 && &data[4..8] == b"ftyp" {
        Some(MediaKind::IsoBmff)
    } else {
        None
    }
}

// ── Chunked stream ──────────────────────────────────────────────

fn frame_aad(index: u64, is_final: bool) -> [u8; 9] {
    let mut aad = [0u8; 9];
    aad[..8].copy_from_slice(&index.to_le_bytes());
    aad[8] = u8::from(is_final);
    aad
}

/// Encrypts `plaintext` in the chunked stream layout.
///
/// An empty input still produces one (empty) final frame so the reader can
/// tell a complete stream from a truncated one.
pub fn encrypt_media_chunked(
    plaintext: &[u8],
    key: &MediaKey,
    chunk_size: usize,
) -> CryptoResult<Vec<u8>> {
    let chunk_size = chunk_size.max(1);
    let mut out = vec![CHUNKED_VERSION];
    let mut chunks: Vec<&[u8]> = plaintext.chunks(chunk_size).collect();
    if chunks.is_empty() {
        chunks.push(&[]);
    }
    let last = chunks.len() - 1;

    for (i, chunk) in chunks.into_iter().enumerate() {
        let sealed = seal_with_aad(key.as_bytes(), chunk, &frame_aad(i as u64, i == last))?;
        let len = u32::try_from(sealed.len())
            .map_err(|_| CryptoError::Encryption("frame exceeds u32 length".into()))?;
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&sealed);
    }
    Ok(out)
}

fn decrypt_media_chunked(data: &[u8], key: &MediaKey) -> CryptoResult<Vec<u8>> {
    let Some((&CHUNKED_VERSION, mut rest)) = data.split_first() else {
        return Err(CryptoError::AuthenticationFailure);
    };

    let mut out = Vec::with_capacity(data.len());
    let mut index = 0u64;
    while !rest.is_empty() {
        if rest.len() < 4 {
            return Err(CryptoError::AuthenticationFailure);
        }
        let (len_bytes, tail) = rest.split_at(4);
        let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]])
            as usize;
        if tail.len() < len {
            return Err(CryptoError::AuthenticationFailure);
        }
        let (frame, tail) = tail.split_at(len);
        // The final flag is bound into the tag, so a stream cut at a frame
        // boundary fails here.
        let plain = open_with_aad(key.as_bytes(), frame, &frame_aad(index, tail.is_empty()))?;
        out.extend_from_slice(&plain);
        rest = tail;
        index += 1;
    }

    if index == 0 {
        return Err(CryptoError::AuthenticationFailure);
    }
    Ok(out)
}

/// Seals a whole file as one blob with its per-file key (older layout).
pub fn seal_legacy_media(plaintext: &[u8], key: &MediaKey) -> CryptoResult<Vec<u8>> {
    seal_raw(key.as_bytes(), plaintext)
}

// ── Strategy chain ──────────────────────────────────────────────

/// Inputs available to a decoding strategy.
pub struct MediaContext<'a> {
    pub master: Option<&'a MasterKey>,
    pub key_id: &'a str,
}

impl MediaContext<'_> {
    fn file_key(&self) -> CryptoResult<MediaKey> {
        match self.master {
            Some(master) => master.file_key(self.key_id),
            None => Err(CryptoError::KeyDerivation("no master key available".into())),
        }
    }
}

/// One on-disk media layout.
pub trait TryDecode: Send + Sync {
    fn name(&self) -> &'static str;

    fn try_decode(&self, data: &[u8], ctx: &MediaContext<'_>) -> CryptoResult<Vec<u8>>;
}

/// Unencrypted media carrying a known signature.
pub struct PlaintextMedia;

impl TryDecode for PlaintextMedia {
    fn name(&self) -> &'static str {
        "plaintext"
    }

    fn try_decode(&self, data: &[u8], _ctx: &MediaContext<'_>) -> CryptoResult<Vec<u8>> {
        match sniff_media_kind(data) {
            Some(_) => Ok(data.to_vec()),
            None => Err(CryptoError::AuthenticationFailure),
        }
    }
}

pub struct ChunkedMedia;

impl TryDecode for ChunkedMedia {
    fn name(&self) -> &'static str {
        "chunked"
    }

    fn try_decode(&self, data: &[u8], ctx: &MediaContext<'_>) -> CryptoResult<Vec<u8>> {
        decrypt_media_chunked(data, &ctx.file_key()?)
    }
}

pub struct LegacyWholeFile;

impl TryDecode for LegacyWholeFile {
    fn name(&self) -> &'static str {
        "legacy-whole-file"
    }

    fn try_decode(&self, data: &[u8], ctx: &MediaContext<'_>) -> CryptoResult<Vec<u8>> {
        open_raw(ctx.file_key()?.as_bytes(), data)
    }
}

/// Result of a successful decode.
#[derive(Debug)]
pub struct Decoded {
    pub bytes: Vec<u8>,
    pub strategy: &'static str,
}

/// Ordered list of [`TryDecode`] strategies; the first success wins.
pub struct MediaDecoder {
    strategies: Vec<Box<dyn TryDecode>>,
}

impl Default for MediaDecoder {
    fn default() -> Self {
        Self {
            strategies: vec![
                Box::new(PlaintextMedia),
                Box::new(ChunkedMedia),
                Box::new(LegacyWholeFile),
            ],
        }
    }
}

impl MediaDecoder {
    pub fn with_strategies(strategies: Vec<Box<dyn TryDecode>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn decode(&self, data: &[u8], ctx: &MediaContext<'_>) -> CryptoResult<Decoded> {
        for strategy in &self.strategies {
            match strategy.try_decode(data, ctx) {
                Ok(bytes) => {
                    return Ok(Decoded {
                        bytes,
                        strategy: strategy.name(),
                    });
                }
                Err(e) => trace!("{} declined {}: {e}", strategy.name(), ctx.key_id),
            }
        }
        Err(CryptoError::AuthenticationFailure)
    }
}
