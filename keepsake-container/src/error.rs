use thiserror::Error;

pub type ContainerResult<T> = Result<T, ContainerError>;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("not a backup container (bad magic)")]
    InvalidFormat,

    #[error("container header is truncated")]
    TruncatedHeader,

    #[error("container metadata is truncated: declared {declared} bytes, {available} available")]
    TruncatedMetadata { declared: u64, available: u64 },

    #[error("invalid container metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("media source for {path} yielded {actual} of {expected} bytes")]
    MediaLengthMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    #[error("media blob {index} is truncated: expected {expected} bytes, {actual} available")]
    TruncatedMediaData {
        index: usize,
        expected: u64,
        actual: u64,
    },

    #[error("media blob index {index} out of range ({count} blobs)")]
    BlobIndexOutOfRange { index: usize, count: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
