//! Artifact file naming: `backup-<uuid>.enc` and the exporter's `.bin`.

use crate::error::{MigrationError, MigrationResult};
use std::path::Path;
use uuid::Uuid;

pub const ARTIFACT_PREFIX: &str = "backup-";
pub const SEALED_EXTENSION: &str = "enc";
pub const CONTAINER_EXTENSION: &str = "bin";

/// `backup-<id>.enc`
pub fn artifact_file_name(backup_id: &Uuid) -> String {
    format!("{ARTIFACT_PREFIX}{backup_id}.{SEALED_EXTENSION}")
}

/// `backup-<id>.bin`
pub fn container_file_name(backup_id: &Uuid) -> String {
    format!("{ARTIFACT_PREFIX}{backup_id}.{CONTAINER_EXTENSION}")
}

/// Recovers the backup id from `backup-<uuid>.<ext>`. Any extension is
/// accepted; the id is what matters for key derivation.
pub fn parse_backup_id(path: &Path) -> MigrationResult<Uuid> {
    let malformed = || MigrationError::MalformedArtifactName(path.display().to_string());
    let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(malformed)?;
    let id = stem.strip_prefix(ARTIFACT_PREFIX).ok_or_else(malformed)?;
    Uuid::parse_str(id).map_err(|_| malformed())
}

/// True for names produced by [`artifact_file_name`].
pub fn is_sealed_artifact(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(SEALED_EXTENSION)
        && parse_backup_id(path).is_ok()
}
