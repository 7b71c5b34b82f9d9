//! Restore: sealed artifact → master key, media tree and structured data.
//!
//! Every check that can reject the artifact (name, authentication, schema
//! version, blob bounds, path safety) runs before the first destructive
//! step. After that the restore is best-effort: a failure leaves earlier
//! steps applied and is reported as [`MigrationError::PartialRestore`].

use crate::background::BackgroundTask;
use crate::config::MigrationConfig;
use crate::error::{MigrationError, MigrationResult};
use crate::media_scan::safe_join;
use crate::naming::parse_backup_id;
use crate::progress::{Progress, Reporter, Step};
use crate::translate::{category_from_dto, media_item_from_dto, record_from_dto};
use keepsake_container::ContainerReader;
use keepsake_crypto::{KEY_SIZE, MasterKey, MediaContext, MediaDecoder, derive_key, key_id_for, open};
use keepsake_model::{
    BackupPayload, CredentialStore, MASTER_KEY_NAME, RecordKind, RecordStore, SCHEMA_VERSION,
    StoreError,
};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

/// Destructive phases of a restore, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestoreStep {
    MasterKey,
    MediaFiles,
    Records,
    MediaVerification,
}

/// What happened to the media master key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterKeyOutcome {
    /// The key carried in the backup was installed.
    Installed,
    /// The backup had no key; a fresh one was generated. Media encrypted
    /// under the old key will not decode.
    Regenerated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestoreReport {
    pub backup_id: Uuid,
    pub master_key: MasterKeyOutcome,
    pub categories_restored: usize,
    pub records_restored: usize,
    pub media_items_restored: usize,
    pub media_files_restored: usize,
    pub relations_restored: usize,
    /// Relations naming a record or category absent from the payload.
    pub dangling_relations: usize,
    /// Media items whose owning record is absent; restored unlinked.
    pub dangling_owners: usize,
    /// Categories whose parent is absent; restored as roots.
    pub dangling_parents: usize,
    /// Files the media decoder could not read. `None` when verification is off.
    pub unreadable_media: Option<usize>,
    pub completed: Vec<RestoreStep>,
}

/// Restores a device from an encrypted backup artifact.
pub struct RestoreImporter {
    store: Arc<dyn RecordStore>,
    credentials: Arc<dyn CredentialStore>,
    config: MigrationConfig,
    decoder: MediaDecoder,
}

impl RestoreImporter {
    pub fn new(
        store: Arc<dyn RecordStore>,
        credentials: Arc<dyn CredentialStore>,
        config: MigrationConfig,
    ) -> Self {
        Self {
            store,
            credentials,
            config,
            decoder: MediaDecoder::default(),
        }
    }

    /// Replaces the decoder used when `verify_media` is set.
    pub fn with_decoder(mut self, decoder: MediaDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn restore(
        &self,
        artifact: &Path,
        passphrase: &str,
        progress: &mut dyn FnMut(Progress),
    ) -> MigrationResult<RestoreReport> {
        let mut reporter = Reporter::new(progress);

        let backup_id = parse_backup_id(artifact)?;
        reporter.report(Step::Decrypting, 0.05);

        let key = derive_key(passphrase, &backup_id);
        let sealed = std::fs::read(artifact)?;
        let plaintext = Zeroizing::new(open(&sealed, &key)?);
        drop(sealed);

        reporter.report(Step::ReadingContainer, 0.20);
        let mut reader = ContainerReader::open(Cursor::new(plaintext.as_slice()))?;
        let targets = validate(reader.payload(), &self.config.media_root)?;
        reader.ensure_media_consumable()?;
        debug!("backup {backup_id} passed pre-restore validation");

        let mut state = RestoreState::new(backup_id);
        match self.apply(&mut reader, &targets, &mut reporter, &mut state) {
            Ok(()) => {
                reporter.report(Step::Finished, 1.0);
                let report = state.into_report();
                info!("restored backup {backup_id}: {report:?}");
                Ok(report)
            }
            Err(e) if state.completed.is_empty() => Err(e),
            Err(e) => {
                warn!("restore of {backup_id} failed after {:?}: {e}", state.completed);
                Err(MigrationError::PartialRestore {
                    completed: state.completed,
                    source: Box::new(e),
                })
            }
        }
    }

    fn apply(
        &self,
        reader: &mut ContainerReader<Cursor<&[u8]>>,
        targets: &[PathBuf],
        reporter: &mut Reporter<'_>,
        state: &mut RestoreState,
    ) -> MigrationResult<()> {
        reporter.report(Step::RestoringMasterKey, 0.30);
        let master = self.install_master_key(reader.payload(), state)?;
        state.completed.push(RestoreStep::MasterKey);

        reporter.report(Step::RestoringMedia, 0.45);
        self.restore_media(reader, targets, reporter, state)?;
        state.completed.push(RestoreStep::MediaFiles);

        reporter.report(Step::RestoringRecords, 0.70);
        self.restore_records(reader.payload(), state)?;
        state.completed.push(RestoreStep::Records);

        if self.config.verify_media {
            reporter.report(Step::VerifyingMedia, 0.90);
            let unreadable = self.verify_media(reader.payload(), targets, Some(&master))?;
            state.unreadable_media = Some(unreadable);
            state.completed.push(RestoreStep::MediaVerification);
        }
        Ok(())
    }

    fn install_master_key(
        &self,
        payload: &BackupPayload,
        state: &mut RestoreState,
    ) -> MigrationResult<MasterKey> {
        let (bytes, outcome) = match &payload.master_key_material {
            Some(material) => (
                Zeroizing::new(material.as_bytes().to_vec()),
                MasterKeyOutcome::Installed,
            ),
            None => {
                warn!("backup carries no media master key; generating a new one");
                let fresh = MasterKey::generate();
                (
                    Zeroizing::new(fresh.as_bytes().to_vec()),
                    MasterKeyOutcome::Regenerated,
                )
            }
        };
        if !self.credentials.set(MASTER_KEY_NAME, &bytes) {
            return Err(MigrationError::CredentialWriteRefused);
        }
        state.master_key = outcome;
        Ok(MasterKey::from_bytes(&bytes)?)
    }

    fn restore_media(
        &self,
        reader: &mut ContainerReader<Cursor<&[u8]>>,
        targets: &[PathBuf],
        reporter: &mut Reporter<'_>,
        state: &mut RestoreState,
    ) -> MigrationResult<()> {
        let root = &self.config.media_root;
        if root.exists() {
            std::fs::remove_dir_all(root)?;
        }
        std::fs::create_dir_all(root)?;

        let total = targets.len() as u64;
        for (index, target) in targets.iter().enumerate() {
            let dir = target.parent().unwrap_or(root);
            std::fs::create_dir_all(dir)?;
            let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
            reader.copy_blob(index, &mut tmp)?;
            tmp.flush()?;
            tmp.persist(target).map_err(|e| e.error)?;
            state.media_files_restored += 1;
            reporter.report_span(Step::RestoringMedia, 0.45, 0.25, index as u64 + 1, total);
        }
        Ok(())
    }

    fn restore_records(
        &self,
        payload: &BackupPayload,
        state: &mut RestoreState,
    ) -> MigrationResult<()> {
        let store = &self.store;

        store.delete_all(RecordKind::Record)?;
        store.delete_all(RecordKind::Category)?;
        store.delete_all(RecordKind::MediaItem)?;
        store.save()?;

        let category_ids: HashSet<Uuid> = payload.categories.iter().map(|c| c.id).collect();
        let record_ids: HashSet<Uuid> = payload.records.iter().map(|r| r.id).collect();

        for dto in &payload.categories {
            store.create_category(&category_from_dto(dto))?;
            state.categories_restored += 1;
        }
        for dto in &payload.records {
            store.create_record(&record_from_dto(dto))?;
            state.records_restored += 1;
        }
        for dto in &payload.media_items {
            let owner = dto.record_id.filter(|id| record_ids.contains(id));
            if dto.record_id.is_some() && owner.is_none() {
                state.dangling_owners += 1;
            }
            store.create_media_item(&media_item_from_dto(dto, owner))?;
            state.media_items_restored += 1;
        }
        for rel in &payload.relations {
            if !record_ids.contains(&rel.record_id) || !category_ids.contains(&rel.category_id) {
                state.dangling_relations += 1;
                continue;
            }
            match store.link_record_category(rel.record_id, rel.category_id) {
                Ok(()) => state.relations_restored += 1,
                Err(StoreError::NotFound(what)) => {
                    debug!("relation endpoint vanished: {what}");
                    state.dangling_relations += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        // Parents last, so input order never matters.
        for dto in &payload.categories {
            let Some(parent) = dto.parent_id else { continue };
            if !category_ids.contains(&parent) {
                state.dangling_parents += 1;
                continue;
            }
            store.set_category_parent(dto.id, parent)?;
        }
        store.save()?;

        let dangling = state.dangling_relations + state.dangling_owners + state.dangling_parents;
        if dangling > 0 {
            warn!(
                "skipped dangling references: {} relations, {} media owners, {} parents",
                state.dangling_relations, state.dangling_owners, state.dangling_parents
            );
        }
        Ok(())
    }

    fn verify_media(
        &self,
        payload: &BackupPayload,
        targets: &[PathBuf],
        master: Option<&MasterKey>,
    ) -> MigrationResult<usize> {
        let mut unreadable = 0;
        for (descriptor, target) in payload.media_files.iter().zip(targets) {
            let data = std::fs::read(target)?;
            let key_id = key_id_for(target);
            let ctx = MediaContext {
                master,
                key_id: &key_id,
            };
            match self.decoder.decode(&data, &ctx) {
                Ok(decoded) => debug!("{} decoded as {}", descriptor.relative_path, decoded.strategy),
                Err(_) => {
                    warn!("restored media {} is unreadable", descriptor.relative_path);
                    unreadable += 1;
                }
            }
        }
        Ok(unreadable)
    }

    /// Runs [`restore`](Self::restore) on a blocking worker.
    pub fn restore_in_background(
        self: Arc<Self>,
        artifact: PathBuf,
        passphrase: String,
    ) -> BackgroundTask<RestoreReport> {
        BackgroundTask::spawn(move |progress| self.restore(&artifact, &passphrase, progress))
    }
}

/// Rejects payloads this build must not apply and resolves every media
/// target path.
fn validate(payload: &BackupPayload, media_root: &Path) -> MigrationResult<Vec<PathBuf>> {
    if payload.schema_version != SCHEMA_VERSION {
        return Err(MigrationError::UnsupportedSchemaVersion {
            found: payload.schema_version,
            supported: SCHEMA_VERSION,
        });
    }
    if let Some(material) = &payload.master_key_material
        && material.len() != KEY_SIZE
    {
        return Err(MigrationError::InvalidMasterKey {
            length: material.len(),
        });
    }

    let targets = payload
        .media_files
        .iter()
        .map(|f| {
            safe_join(media_root, &f.relative_path)
                .ok_or_else(|| MigrationError::UnsafeMediaPath(f.relative_path.clone()))
        })
        .collect::<MigrationResult<Vec<_>>>()?;

    // Each target must be a distinct file, and no target may sit where
    // another one needs a directory.
    let mut claimed = HashSet::new();
    for (target, file) in targets.iter().zip(&payload.media_files) {
        if !claimed.insert(target.as_path()) {
            return Err(MigrationError::MediaPathConflict(file.relative_path.clone()));
        }
    }
    for (target, file) in targets.iter().zip(&payload.media_files) {
        if target
            .ancestors()
            .skip(1)
            .take_while(|dir| *dir != media_root)
            .any(|dir| claimed.contains(dir))
        {
            return Err(MigrationError::MediaPathConflict(file.relative_path.clone()));
        }
    }
    Ok(targets)
}

struct RestoreState {
    backup_id: Uuid,
    completed: Vec<RestoreStep>,
    master_key: MasterKeyOutcome,
    categories_restored: usize,
    records_restored: usize,
    media_items_restored: usize,
    media_files_restored: usize,
    relations_restored: usize,
    dangling_relations: usize,
    dangling_owners: usize,
    dangling_parents: usize,
    unreadable_media: Option<usize>,
}

impl RestoreState {
    fn new(backup_id: Uuid) -> Self {
        Self {
            backup_id,
            completed: Vec::new(),
            master_key: MasterKeyOutcome::Installed,
            categories_restored: 0,
            records_restored: 0,
            media_items_restored: 0,
            media_files_restored: 0,
            relations_restored: 0,
            dangling_relations: 0,
            dangling_owners: 0,
            dangling_parents: 0,
            unreadable_media: None,
        }
    }

    fn into_report(self) -> RestoreReport {
        RestoreReport {
            backup_id: self.backup_id,
            master_key: self.master_key,
            categories_restored: self.categories_restored,
            records_restored: self.records_restored,
            media_items_restored: self.media_items_restored,
            media_files_restored: self.media_files_restored,
            relations_restored: self.relations_restored,
            dangling_relations: self.dangling_relations,
            dangling_owners: self.dangling_owners,
            dangling_parents: self.dangling_parents,
            unreadable_media: self.unreadable_media,
            completed: self.completed,
        }
    }
}
