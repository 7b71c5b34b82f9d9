//! Backup export: store snapshot + media tree → sealed `backup-<id>.enc`.

use crate::background::BackgroundTask;
use crate::config::MigrationConfig;
use crate::error::MigrationResult;
use crate::media_scan::scan_media_root;
use crate::naming::{artifact_file_name, container_file_name};
use crate::progress::{Progress, Reporter, Step};
use crate::translate::{DroppedCounts, translate_snapshot};
use keepsake_container::{DirSource, write_container};
use keepsake_crypto::{KEY_SIZE, derive_key, seal_file};
use keepsake_model::{BackupPayload, CredentialStore, KeyMaterial, MASTER_KEY_NAME, RecordStore};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

/// Result of a successful export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutcome {
    pub artifact_path: PathBuf,
    pub backup_id: Uuid,
    pub media_files: usize,
    pub media_bytes: u64,
    pub broken_media_count: usize,
    pub dropped: DroppedCounts,
    pub included_master_key: bool,
}

/// Produces encrypted backup artifacts.
pub struct BackupExporter {
    store: Arc<dyn RecordStore>,
    credentials: Arc<dyn CredentialStore>,
    config: MigrationConfig,
}

impl BackupExporter {
    pub fn new(
        store: Arc<dyn RecordStore>,
        credentials: Arc<dyn CredentialStore>,
        config: MigrationConfig,
    ) -> Self {
        Self {
            store,
            credentials,
            config,
        }
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Builds and seals a backup with a fresh backup id.
    ///
    /// On any failure the plaintext `.bin` is removed and no `.enc` is left
    /// behind.
    pub fn export(
        &self,
        passphrase: &str,
        progress: &mut dyn FnMut(Progress),
    ) -> MigrationResult<ExportOutcome> {
        self.export_with_id(Uuid::new_v4(), passphrase, progress)
    }

    fn export_with_id(
        &self,
        backup_id: Uuid,
        passphrase: &str,
        progress: &mut dyn FnMut(Progress),
    ) -> MigrationResult<ExportOutcome> {
        let mut reporter = Reporter::new(progress);

        reporter.report(Step::CollectingData, 0.05);
        let snapshot = self.store.snapshot()?;
        let translated = translate_snapshot(&snapshot);

        reporter.report(Step::ScanningMedia, 0.20);
        let scan = scan_media_root(&self.config.media_root);
        if scan.broken > 0 {
            warn!("{} media entries could not be read and are left out", scan.broken);
        }

        reporter.report(Step::ReadingMasterKey, 0.25);
        let master_key = match self.credentials.get(MASTER_KEY_NAME) {
            Some(bytes) if bytes.len() == KEY_SIZE => Some(KeyMaterial::new(bytes)),
            Some(bytes) => {
                warn!(
                    "stored media master key has {} bytes; exporting without it",
                    bytes.len()
                );
                None
            }
            None => {
                warn!("no media master key in credential store; exporting without it");
                None
            }
        };

        let mut payload = BackupPayload::new(backup_id, self.config.app_version.clone());
        payload.categories = translated.categories;
        payload.records = translated.records;
        payload.media_items = translated.media_items;
        payload.relations = translated.relations;
        payload.media_files = scan.files;
        payload.has_broken_media = scan.broken > 0;
        payload.broken_media_count = scan.broken;
        payload.master_key_material = master_key;
        payload.refresh_stats();

        std::fs::create_dir_all(&self.config.backups_dir)?;
        let container = ScratchFile::new(self.config.backups_dir.join(container_file_name(&backup_id)));
        let artifact_path = self.config.backups_dir.join(artifact_file_name(&backup_id));

        reporter.report(Step::BuildingContainer, 0.30);
        {
            let mut out = BufWriter::new(File::create(container.path())?);
            let mut source = DirSource::new(&self.config.media_root);
            write_container(&mut out, &payload, &mut source, &mut |done, total| {
                reporter.report_span(Step::WritingMedia, 0.30, 0.50, done, total);
            })?;
        }

        reporter.report(Step::Encrypting, 0.90);
        let plaintext = Zeroizing::new(std::fs::read(container.path())?);
        let key = derive_key(passphrase, &backup_id);
        if let Err(e) = seal_file(&artifact_path, &plaintext, &key) {
            let _ = std::fs::remove_file(&artifact_path);
            return Err(e.into());
        }
        drop(plaintext);
        drop(container);

        reporter.report(Step::Finished, 1.0);
        info!(
            "exported backup {backup_id}: {} categories, {} records, {} media items, {} files ({} bytes)",
            payload.entity_stats.category_count,
            payload.entity_stats.record_count,
            payload.entity_stats.media_item_count,
            payload.media_stats.total_files,
            payload.media_stats.total_bytes
        );

        Ok(ExportOutcome {
            artifact_path,
            backup_id,
            media_files: payload.media_stats.total_files,
            media_bytes: payload.media_stats.total_bytes,
            broken_media_count: payload.broken_media_count,
            dropped: translated.dropped,
            included_master_key: payload.master_key_material.is_some(),
        })
    }

    /// Runs [`export`](Self::export) on a blocking worker.
    pub fn export_in_background(
        self: Arc<Self>,
        passphrase: String,
    ) -> BackgroundTask<ExportOutcome> {
        BackgroundTask::spawn(move |progress| self.export(&passphrase, progress))
    }
}

/// Deletes the wrapped path when dropped.
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!("could not remove {}: {e}", self.path.display());
        }
    }
}
