use crate::error::{ContainerError, ContainerResult};
use crate::{HEADER_LEN, MAGIC};
use keepsake_model::BackupPayload;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// Absolute position of one blob inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobSpan {
    pub offset: u64,
    pub length: u64,
}

impl BlobSpan {
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }
}

/// Maps a blob index to its span by prefix-summing declared lengths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLocator {
    spans: Vec<BlobSpan>,
    /// First byte after the last declared blob. `None` if the declared
    /// lengths overflow u64.
    end: Option<u64>,
}

impl BlobLocator {
    pub fn new(data_start: u64, lengths: impl IntoIterator<Item = u64>) -> Self {
        let mut spans = Vec::new();
        let mut cursor = Some(data_start);
        for length in lengths {
            let offset = cursor.unwrap_or(u64::MAX);
            spans.push(BlobSpan { offset, length });
            cursor = cursor.and_then(|c| c.checked_add(length));
        }
        Self { spans, end: cursor }
    }

    pub fn locate(&self, index: usize) -> Option<BlobSpan> {
        self.spans.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn end(&self) -> Option<u64> {
        self.end
    }
}

/// Random-access reader over a container.
pub struct ContainerReader<R> {
    inner: R,
    payload: BackupPayload,
    locator: BlobLocator,
    stream_len: u64,
}

impl<R: Read + Seek> ContainerReader<R> {
    /// Validates the header and parses the metadata.
    ///
    /// Does not touch the blob region; call
    /// [`ensure_media_consumable`](Self::ensure_media_consumable) for that.
    pub fn open(mut inner: R) -> ContainerResult<Self> {
        let stream_len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; MAGIC.len()];
        let got = read_up_to(&mut inner, &mut magic)?;
        if magic[..got] != MAGIC[..got] {
            return Err(ContainerError::InvalidFormat);
        }
        if got < MAGIC.len() {
            return Err(ContainerError::TruncatedHeader);
        }

        let mut len_bytes = [0u8; 8];
        if read_up_to(&mut inner, &mut len_bytes)? < len_bytes.len() {
            return Err(ContainerError::TruncatedHeader);
        }
        let declared = u64::from_le_bytes(len_bytes);
        let available = stream_len.saturating_sub(HEADER_LEN);
        if declared > available {
            return Err(ContainerError::TruncatedMetadata {
                declared,
                available,
            });
        }

        let mut metadata = vec![0u8; declared as usize];
        inner.read_exact(&mut metadata)?;
        let payload: BackupPayload = serde_json::from_slice(&metadata)?;

        let locator = BlobLocator::new(
            HEADER_LEN + declared,
            payload.media_files.iter().map(|f| f.byte_length),
        );

        Ok(Self {
            inner,
            payload,
            locator,
            stream_len,
        })
    }

    pub fn payload(&self) -> &BackupPayload {
        &self.payload
    }

    pub fn into_payload(self) -> BackupPayload {
        self.payload
    }

    pub fn locator(&self) -> &BlobLocator {
        &self.locator
    }

    /// Checks that every declared blob lies within the stream.
    pub fn ensure_media_consumable(&self) -> ContainerResult<()> {
        for index in 0..self.locator.len() {
            let span = self.span(index)?;
            let fits = span
                .offset
                .checked_add(span.length)
                .is_some_and(|end| end <= self.stream_len);
            if !fits {
                return Err(ContainerError::TruncatedMediaData {
                    index,
                    expected: span.length,
                    actual: self.stream_len.saturating_sub(span.offset),
                });
            }
        }
        Ok(())
    }

    /// Streams blob `index` into `out`; returns the bytes copied.
    pub fn copy_blob<W: Write + ?Sized>(&mut self, index: usize, out: &mut W) -> ContainerResult<u64> {
        let span = self.span(index)?;
        self.inner.seek(SeekFrom::Start(span.offset))?;
        let copied = io::copy(&mut (&mut self.inner).take(span.length), out)?;
        if copied != span.length {
            return Err(ContainerError::TruncatedMediaData {
                index,
                expected: span.length,
                actual: copied,
            });
        }
        Ok(copied)
    }

    /// Reads blob `index` into memory.
    pub fn blob(&mut self, index: usize) -> ContainerResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.copy_blob(index, &mut buf)?;
        Ok(buf)
    }

    fn span(&self, index: usize) -> ContainerResult<BlobSpan> {
        self.locator
            .locate(index)
            .ok_or(ContainerError::BlobIndexOutOfRange {
                index,
                count: self.locator.len(),
            })
    }
}

/// Opens a container held in memory.
pub fn read_container(bytes: &[u8]) -> ContainerResult<ContainerReader<Cursor<&[u8]>>> {
    ContainerReader::open(Cursor::new(bytes))
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
