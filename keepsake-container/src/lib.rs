//! Binary container codec for Keepsake backups.
//!
//! # Layout
//!
//! ```text
//! [ MAGIC "KEEPBACK1" (9) | metadata length (u64 LE) | metadata JSON | blob 0 | blob 1 | ... ]
//! ```
//!
//! The metadata is a [`BackupPayload`](keepsake_model::BackupPayload). Its
//! `mediaFiles` list is the only index of the blob region: blob *i* starts
//! at the end of the metadata plus the lengths of blobs `0..i`. Blobs carry
//! no framing of their own.

mod error;
mod reader;
mod writer;

pub use error::{ContainerError, ContainerResult};
pub use reader::{BlobLocator, BlobSpan, ContainerReader, read_container};
pub use writer::{DirSource, MediaSource, write_container};

/// Container signature.
pub const MAGIC: &[u8; 9] = b"KEEPBACK1";

/// Bytes preceding the metadata: magic plus the u64 length.
pub const HEADER_LEN: u64 = MAGIC.len() as u64 + 8;
