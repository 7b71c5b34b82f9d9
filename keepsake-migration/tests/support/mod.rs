#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use keepsake_container::write_container;
use keepsake_crypto::{derive_key, seal_file};
use keepsake_migration::{BackupExporter, MigrationConfig, RestoreImporter, artifact_file_name};
use keepsake_model::{
    BackupPayload, Category, MASTER_KEY_NAME, MediaFileDescriptor, MediaItem,
    MemoryCredentialStore, MemoryRecordStore, Record, RecordStore,
};
use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

pub const MASTER_KEY: [u8; 32] = [7u8; 32];

/// 10-byte JPEG-signed image and 20-byte QuickTime-signed video.
pub fn image_bytes() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F']
}

pub fn video_bytes() -> Vec<u8> {
    let mut v = vec![0, 0, 0, 0x14];
    v.extend_from_slice(b"ftypqt  ");
    v.resize(20, 0xAB);
    v
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap()
}

/// One simulated device: a scratch root, stores and config.
pub struct Device {
    _root: TempDir,
    pub config: MigrationConfig,
    pub store: Arc<MemoryRecordStore>,
    pub credentials: Arc<MemoryCredentialStore>,
}

impl Device {
    pub fn new() -> Self {
        Self::with_credentials(MemoryCredentialStore::new())
    }

    pub fn with_credentials(credentials: MemoryCredentialStore) -> Self {
        let root = tempfile::tempdir().unwrap();
        let config = MigrationConfig::under(root.path());
        Self {
            _root: root,
            config,
            store: Arc::new(MemoryRecordStore::new()),
            credentials: Arc::new(credentials),
        }
    }

    pub fn exporter(&self) -> BackupExporter {
        BackupExporter::new(
            self.store.clone(),
            self.credentials.clone(),
            self.config.clone(),
        )
    }

    pub fn importer(&self) -> RestoreImporter {
        RestoreImporter::new(
            self.store.clone(),
            self.credentials.clone(),
            self.config.clone(),
        )
    }

    pub fn write_media(&self, rel: &str, bytes: &[u8]) {
        let path = self.config.media_root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    pub fn read_media(&self, rel: &str) -> Vec<u8> {
        std::fs::read(self.config.media_root.join(rel)).unwrap()
    }
}

/// Ids of the seeded journal.
pub struct Fixture {
    pub root: Uuid,
    pub child: Uuid,
    pub grandchild: Uuid,
    pub records: Vec<Uuid>,
    pub media: Vec<Uuid>,
}

/// Three categories (one nested two levels deep), five records, two media
/// items and two media files.
pub fn seed_journal(device: &Device) -> Fixture {
    let store = &device.store;
    let root = Uuid::new_v4();
    let child = Uuid::new_v4();
    let grandchild = Uuid::new_v4();

    for (id, name, level, parent) in [
        (root, "Travel", 1, None),
        (child, "Europe", 2, Some(root)),
        (grandchild, "Spain", 3, Some(child)),
    ] {
        store
            .create_category(&Category {
                id: Some(id),
                name: Some(name.into()),
                level,
                created_at: Some(at(1)),
                ..Default::default()
            })
            .unwrap();
        if let Some(parent) = parent {
            store.set_category_parent(id, parent).unwrap();
        }
    }

    let records: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
    for (i, id) in records.iter().enumerate() {
        store
            .create_record(&Record {
                id: Some(*id),
                title: Some(format!("Day {i}")),
                content: Some(format!("<p>entry {i}</p>")),
                created_at: Some(at(2)),
                updated_at: Some(at(3)),
                timestamp: Some(at(2 + i as u32)),
                mood: Some("calm".into()),
                latitude: 40.4,
                longitude: -3.7,
                ..Default::default()
            })
            .unwrap();
    }
    store.link_record_category(records[0], grandchild).unwrap();
    store.link_record_category(records[1], child).unwrap();
    store.link_record_category(records[1], root).unwrap();

    let media = vec![Uuid::new_v4(), Uuid::new_v4()];
    for (id, kind, file, owner) in [
        (media[0], "image", "Images/2025/03/a.jpg", records[0]),
        (media[1], "video", "Videos/2025/03/b.mov", records[1]),
    ] {
        store
            .create_media_item(&MediaItem {
                id: Some(id),
                kind: Some(kind.into()),
                file_name: Some(file.into()),
                created_at: Some(at(4)),
                record_id: Some(owner),
                ..Default::default()
            })
            .unwrap();
    }

    device.write_media("Images/2025/03/a.jpg", &image_bytes());
    device.write_media("Videos/2025/03/b.mov", &video_bytes());

    Fixture {
        root,
        child,
        grandchild,
        records,
        media,
    }
}

pub fn seeded_source() -> (Device, Fixture) {
    let device = Device::with_credentials(MemoryCredentialStore::with_secret(
        MASTER_KEY_NAME,
        &MASTER_KEY,
    ));
    let fixture = seed_journal(&device);
    (device, fixture)
}

/// Writes a sealed artifact for a hand-built payload. `blobs` must line up
/// with `payload.media_files`.
pub fn seal_payload(
    dir: &Path,
    payload: &mut BackupPayload,
    blobs: &[(&str, Vec<u8>)],
    passphrase: &str,
) -> PathBuf {
    let mut map = HashMap::new();
    payload.media_files.clear();
    for (path, bytes) in blobs {
        payload
            .media_files
            .push(MediaFileDescriptor::new(*path, bytes.len() as u64));
        map.insert(path.to_string(), bytes.clone());
    }
    payload.refresh_stats();

    let mut source = move |p: &str| -> io::Result<Box<dyn Read>> {
        Ok(Box::new(Cursor::new(map.get(p).cloned().unwrap_or_default())))
    };
    let mut container = Vec::new();
    write_container(&mut container, payload, &mut source, &mut |_, _| {}).unwrap();
    seal_raw_container(dir, payload.backup_id, &container, passphrase)
}

/// Seals arbitrary container bytes under the artifact name for `backup_id`.
pub fn seal_raw_container(dir: &Path, backup_id: Uuid, container: &[u8], passphrase: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(artifact_file_name(&backup_id));
    seal_file(&path, container, &derive_key(passphrase, &backup_id)).unwrap();
    path
}

pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
