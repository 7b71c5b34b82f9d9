use keepsake_model::StoreError;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { kind, id } => StoreError::NotFound(format!("{kind} {id}")),
            other => StoreError::Backend(other.to_string()),
        }
    }
}
