//! Migration configuration.

use crate::error::{MigrationError, MigrationResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where migration reads and writes on the local device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Root of the media tree that is backed up and replaced on restore.
    pub media_root: PathBuf,

    /// Directory holding `backup-<id>.enc` artifacts.
    pub backups_dir: PathBuf,

    /// Probe every restored media file with the media decoder.
    pub verify_media: bool,

    /// Stamped into every exported payload.
    pub app_version: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("Media"),
            backups_dir: PathBuf::from("MigrationBackups"),
            verify_media: false,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl MigrationConfig {
    /// Lays out `Media/` and `MigrationBackups/` under `root`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            media_root: root.join("Media"),
            backups_dir: root.join("MigrationBackups"),
            ..Self::default()
        }
    }

    pub fn from_toml_str(s: &str) -> MigrationResult<Self> {
        toml::from_str(s).map_err(|e| MigrationError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> MigrationResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}
