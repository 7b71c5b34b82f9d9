//! Migration error types.

use crate::importer::RestoreStep;
use keepsake_container::ContainerError;
use keepsake_crypto::CryptoError;
use keepsake_model::{ErrorKind, StoreError};
use thiserror::Error;

/// Result type for export and restore.
pub type MigrationResult<T> = Result<T, MigrationError>;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("cannot recover backup id from artifact name {0:?}")]
    MalformedArtifactName(String),

    #[error("unsupported backup schema version {found} (this build reads {supported})")]
    UnsupportedSchemaVersion { found: u32, supported: u32 },

    #[error("unsafe media path in backup: {0:?}")]
    UnsafeMediaPath(String),

    /// Two media entries resolve to the same file, or one would need to be
    /// both a file and a directory.
    #[error("conflicting media path in backup: {0:?}")]
    MediaPathConflict(String),

    #[error("backup master key has {length} bytes")]
    InvalidMasterKey { length: usize },

    #[error("container error: {0}")]
    Container(#[from] ContainerError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record store error: {0}")]
    Store(#[from] StoreError),

    #[error("credential store refused to save the master key")]
    CredentialWriteRefused,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("background worker failed: {0}")]
    Worker(String),

    /// A restore failed after it had started replacing local data.
    #[error("restore failed after {completed:?}: {source}")]
    PartialRestore {
        completed: Vec<RestoreStep>,
        #[source]
        source: Box<MigrationError>,
    },
}

impl MigrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MigrationError::MalformedArtifactName(_)
            | MigrationError::UnsupportedSchemaVersion { .. }
            | MigrationError::UnsafeMediaPath(_)
            | MigrationError::MediaPathConflict(_)
            | MigrationError::InvalidMasterKey { .. }
            | MigrationError::Config(_) => ErrorKind::Format,
            MigrationError::Container(e) => match e {
                ContainerError::Io(_)
                | ContainerError::MediaLengthMismatch { .. }
                | ContainerError::TruncatedMediaData { .. } => ErrorKind::Io,
                _ => ErrorKind::Format,
            },
            MigrationError::Crypto(CryptoError::Io(_)) => ErrorKind::Io,
            MigrationError::Crypto(_) => ErrorKind::Crypto,
            MigrationError::Io(_) | MigrationError::Worker(_) => ErrorKind::Io,
            MigrationError::Store(_) | MigrationError::CredentialWriteRefused => ErrorKind::Store,
            MigrationError::PartialRestore { source, .. } => source.kind(),
        }
    }

    /// The single message shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            MigrationError::Crypto(CryptoError::AuthenticationFailure) => {
                "Wrong passphrase or corrupted file.".to_string()
            }
            MigrationError::UnsupportedSchemaVersion { .. } => {
                "This backup was made by an incompatible version of the app.".to_string()
            }
            MigrationError::PartialRestore { source, .. } => {
                format!("Restore stopped partway: {}", source.user_message())
            }
            other => match other.kind() {
                ErrorKind::Format => "The file is not a valid backup.".to_string(),
                ErrorKind::Crypto => "Wrong passphrase or corrupted file.".to_string(),
                ErrorKind::Io => format!("Could not read or write backup files ({other})."),
                ErrorKind::Store => "Could not update the local database.".to_string(),
                ErrorKind::Protocol => "The other device stopped responding.".to_string(),
            },
        }
    }
}
