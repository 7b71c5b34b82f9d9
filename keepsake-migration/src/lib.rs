//! Encrypted backup export and restore for device-to-device migration.
//!
//! # Export
//!
//! [`BackupExporter`] snapshots the record store, enumerates the media
//! root, reads the media master key, writes a plaintext container
//! (`backup-<id>.bin`), seals it into `backup-<id>.enc` and removes the
//! plaintext.
//!
//! # Restore
//!
//! [`RestoreImporter`] decrypts an artifact in memory, validates it, then
//! installs the master key, replaces the media tree and rebuilds the
//! structured data in two passes (entities first, relationships after).

mod background;
pub mod config;
mod error;
pub mod exporter;
pub mod importer;
pub mod media_scan;
pub mod naming;
pub mod progress;
pub mod translate;

pub use background::BackgroundTask;
pub use config::MigrationConfig;
pub use error::{MigrationError, MigrationResult};
pub use exporter::{BackupExporter, ExportOutcome};
pub use importer::{MasterKeyOutcome, RestoreImporter, RestoreReport, RestoreStep};
pub use naming::{artifact_file_name, parse_backup_id};
pub use progress::{Progress, Step};
pub use translate::DroppedCounts;
