use crate::MAGIC;
use crate::error::{ContainerError, ContainerResult};
use keepsake_model::BackupPayload;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tracing::debug;

/// Supplies the bytes of a media file by its container-relative path.
pub trait MediaSource {
    fn open(&mut self, relative_path: &str) -> io::Result<Box<dyn Read>>;
}

impl<F> MediaSource for F
where
    F: FnMut(&str) -> io::Result<Box<dyn Read>>,
{
    fn open(&mut self, relative_path: &str) -> io::Result<Box<dyn Read>> {
        self(relative_path)
    }
}

/// Reads media from a directory tree; relative paths are `/`-separated.
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl MediaSource for DirSource {
    fn open(&mut self, relative_path: &str) -> io::Result<Box<dyn Read>> {
        let mut path = self.root.clone();
        path.extend(relative_path.split('/').filter(|s| !s.is_empty()));
        Ok(Box::new(File::open(path)?))
    }
}

/// Writes a complete container to `out`.
///
/// Blobs are streamed in `payload.media_files` order, exactly `byte_length`
/// bytes each. `progress` receives `(bytes_written, total_bytes)` over the
/// blob region after every blob. Returns the total number of bytes written.
pub fn write_container<W: Write>(
    out: &mut W,
    payload: &BackupPayload,
    source: &mut dyn MediaSource,
    progress: &mut dyn FnMut(u64, u64),
) -> ContainerResult<u64> {
    let metadata = serde_json::to_vec(payload)?;
    let meta_len = metadata.len() as u64;

    out.write_all(MAGIC)?;
    out.write_all(&meta_len.to_le_bytes())?;
    out.write_all(&metadata)?;

    let total = payload.total_media_bytes().unwrap_or(u64::MAX);
    let mut written = 0u64;
    progress(0, total);

    for file in &payload.media_files {
        let reader = source.open(&file.relative_path)?;
        let copied = io::copy(&mut reader.take(file.byte_length), out)?;
        if copied != file.byte_length {
            return Err(ContainerError::MediaLengthMismatch {
                path: file.relative_path.clone(),
                expected: file.byte_length,
                actual: copied,
            });
        }
        written += copied;
        progress(written, total);
    }
    out.flush()?;

    debug!(
        "container written: {} metadata bytes, {} blobs, {written} media bytes",
        meta_len,
        payload.media_files.len()
    );
    Ok(crate::HEADER_LEN + meta_len + written)
}
