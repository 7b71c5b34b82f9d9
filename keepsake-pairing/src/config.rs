use crate::error::{PairingError, PairingResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for one pairing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Discovery service name shared by sender and receiver.
    pub service_type: String,
    /// Length of the receiver's numeric PIN.
    pub pin_digits: usize,
    /// Where received artifacts are moved once the transfer finishes.
    pub backups_dir: PathBuf,
    /// How long `Failed` stays visible before falling back to `Idle`.
    pub failure_display_secs: u64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            service_type: "keepsake-mig".to_string(),
            pin_digits: 6,
            backups_dir: PathBuf::from("MigrationBackups"),
            failure_display_secs: 3,
        }
    }
}

impl PairingConfig {
    /// Default settings with received artifacts landing in `backups_dir`.
    pub fn with_backups_dir(backups_dir: impl Into<PathBuf>) -> Self {
        Self {
            backups_dir: backups_dir.into(),
            ..Self::default()
        }
    }

    pub fn failure_display(&self) -> Duration {
        Duration::from_secs(self.failure_display_secs)
    }

    pub fn from_toml_str(s: &str) -> PairingResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| PairingError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> PairingResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    fn validate(&self) -> PairingResult<()> {
        if !(1..=9).contains(&self.pin_digits) {
            return Err(PairingError::Config(format!(
                "pin_digits must be between 1 and 9, got {}",
                self.pin_digits
            )));
        }
        if self.service_type.is_empty() {
            return Err(PairingError::Config("service_type must not be empty".into()));
        }
        Ok(())
    }
}
