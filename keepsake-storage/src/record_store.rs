//! `RecordStore` backed by DuckDB.

use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use duckdb::{Config, Connection, Row, params};
use keepsake_model::{
    Category, MediaItem, Record, RecordCategoryLink, RecordKind, RecordStore, StoreResult,
    StoreSnapshot,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS categories (
    id VARCHAR,
    name VARCHAR,
    name_en VARCHAR,
    color_hex VARCHAR,
    level SMALLINT NOT NULL DEFAULT 0,
    sort_order INTEGER NOT NULL DEFAULT 0,
    created_at BIGINT,
    icon_name VARCHAR,
    icon_type VARCHAR,
    custom_icon_data BLOB,
    parent_id VARCHAR
);
CREATE TABLE IF NOT EXISTS records (
    id VARCHAR,
    title VARCHAR,
    content VARCHAR,
    plain_text_content VARCHAR,
    created_at BIGINT,
    updated_at BIGINT,
    occurred_at BIGINT,
    is_deleted BOOLEAN NOT NULL DEFAULT FALSE,
    sync_status SMALLINT NOT NULL DEFAULT 0,
    mood VARCHAR,
    location_name VARCHAR,
    location_address VARCHAR,
    location_city VARCHAR,
    latitude DOUBLE NOT NULL DEFAULT 0,
    longitude DOUBLE NOT NULL DEFAULT 0,
    horizontal_accuracy DOUBLE NOT NULL DEFAULT 0,
    vertical_accuracy DOUBLE NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS media_items (
    id VARCHAR,
    kind VARCHAR,
    file_name VARCHAR,
    thumbnail_file_name VARCHAR,
    original_file_name VARCHAR,
    encryption_key_id VARCHAR,
    file_size BIGINT NOT NULL DEFAULT 0,
    created_at BIGINT,
    width INTEGER NOT NULL DEFAULT 0,
    height INTEGER NOT NULL DEFAULT 0,
    duration DOUBLE NOT NULL DEFAULT 0,
    record_id VARCHAR
);
CREATE TABLE IF NOT EXISTS record_categories (
    record_id VARCHAR NOT NULL,
    category_id VARCHAR NOT NULL,
    PRIMARY KEY (record_id, category_id)
);
";

const CATEGORY_COLUMNS: &str = "id, name, name_en, color_hex, level, sort_order, created_at, \
     icon_name, icon_type, custom_icon_data, parent_id";

const RECORD_COLUMNS: &str = "id, title, content, plain_text_content, created_at, updated_at, \
     occurred_at, is_deleted, sync_status, mood, location_name, location_address, location_city, \
     latitude, longitude, horizontal_accuracy, vertical_accuracy";

const MEDIA_COLUMNS: &str = "id, kind, file_name, thumbnail_file_name, original_file_name, \
     encryption_key_id, file_size, created_at, width, height, duration, record_id";

/// Record store backed by a single DuckDB connection.
#[derive(Clone)]
pub struct DuckRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckRecordStore {
    /// Opens or creates a store at the given path.
    ///
    /// If DuckDB cannot replay the write-ahead log left by an interrupted
    /// session, the log is dropped and the open retried once. Changes since
    /// the last `save()` checkpoint are lost. The schema is re-applied
    /// after every open.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = match Self::connect(path) {
            Ok(conn) => conn,
            Err(first) => {
                let wal = wal_path(path);
                if !wal.exists() {
                    return Err(first);
                }
                warn!(
                    "cannot open {} ({first}); discarding {} and retrying",
                    path.display(),
                    wal.display()
                );
                std::fs::remove_file(&wal)?;
                Self::connect(path)?
            }
        };
        Self::with_connection(conn)
    }

    /// One worker thread, 128 MB memory cap.
    fn connect(path: &Path) -> StorageResult<Connection> {
        let config = Config::default().threads(1)?.max_memory("128MB")?;
        Ok(Connection::open_with_flags(path, config)?)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("[DuckRecordStore] recovering from poisoned mutex");
            poisoned.into_inner()
        })
    }

    fn read_categories(conn: &Connection) -> StorageResult<Vec<Category>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY sort_order, name"
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Category {
                    id: uuid_col(row, 0)?,
                    name: row.get(1)?,
                    name_en: row.get(2)?,
                    color_hex: row.get(3)?,
                    level: row.get(4)?,
                    sort_order: row.get(5)?,
                    created_at: time_col(row, 6)?,
                    icon_name: row.get(7)?,
                    icon_type: row.get(8)?,
                    custom_icon_data: row.get(9)?,
                    parent_id: uuid_col(row, 10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn read_records(conn: &Connection) -> StorageResult<Vec<Record>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM records ORDER BY occurred_at"
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Record {
                    id: uuid_col(row, 0)?,
                    title: row.get(1)?,
                    content: row.get(2)?,
                    plain_text_content: row.get(3)?,
                    created_at: time_col(row, 4)?,
                    updated_at: time_col(row, 5)?,
                    timestamp: time_col(row, 6)?,
                    is_deleted: row.get(7)?,
                    sync_status: row.get(8)?,
                    mood: row.get(9)?,
                    location_name: row.get(10)?,
                    location_address: row.get(11)?,
                    location_city: row.get(12)?,
                    latitude: row.get(13)?,
                    longitude: row.get(14)?,
                    horizontal_accuracy: row.get(15)?,
                    vertical_accuracy: row.get(16)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn read_media_items(conn: &Connection) -> StorageResult<Vec<MediaItem>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media_items ORDER BY created_at"
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(MediaItem {
                    id: uuid_col(row, 0)?,
                    kind: row.get(1)?,
                    file_name: row.get(2)?,
                    thumbnail_file_name: row.get(3)?,
                    original_file_name: row.get(4)?,
                    encryption_key_id: row.get(5)?,
                    file_size: row.get(6)?,
                    created_at: time_col(row, 7)?,
                    width: row.get(8)?,
                    height: row.get(9)?,
                    duration: row.get(10)?,
                    record_id: uuid_col(row, 11)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn read_links(conn: &Connection) -> StorageResult<Vec<RecordCategoryLink>> {
        let mut stmt = conn.prepare(
            "SELECT record_id, category_id FROM record_categories ORDER BY record_id, category_id",
        )?;
        let rows: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(r, c)| {
                Some(RecordCategoryLink {
                    record_id: Uuid::parse_str(&r).ok()?,
                    category_id: Uuid::parse_str(&c).ok()?,
                })
            })
            .collect())
    }

    fn exists(conn: &Connection, table: &str, id: Uuid) -> StorageResult<bool> {
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE id = ?"),
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn require(conn: &Connection, table: &'static str, kind: &'static str, id: Uuid) -> StorageResult<()> {
        if Self::exists(conn, table, id)? {
            Ok(())
        } else {
            Err(StorageError::NotFound {
                kind,
                id: id.to_string(),
            })
        }
    }

    fn insert_category(&self, c: &Category) -> StorageResult<()> {
        let conn = self.lock_conn();
        conn.execute(
            &format!("INSERT INTO categories ({CATEGORY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                c.id.map(|u| u.to_string()),
                c.name,
                c.name_en,
                c.color_hex,
                c.level,
                c.sort_order,
                c.created_at.map(|t| t.timestamp_millis()),
                c.icon_name,
                c.icon_type,
                c.custom_icon_data,
                c.parent_id.map(|u| u.to_string()),
            ],
        )?;
        Ok(())
    }

    fn insert_record(&self, r: &Record) -> StorageResult<()> {
        let conn = self.lock_conn();
        conn.execute(
            &format!(
                "INSERT INTO records ({RECORD_COLUMNS}) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                r.id.map(|u| u.to_string()),
                r.title,
                r.content,
                r.plain_text_content,
                r.created_at.map(|t| t.timestamp_millis()),
                r.updated_at.map(|t| t.timestamp_millis()),
                r.timestamp.map(|t| t.timestamp_millis()),
                r.is_deleted,
                r.sync_status,
                r.mood,
                r.location_name,
                r.location_address,
                r.location_city,
                r.latitude,
                r.longitude,
                r.horizontal_accuracy,
                r.vertical_accuracy,
            ],
        )?;
        Ok(())
    }

    fn insert_media_item(&self, m: &MediaItem) -> StorageResult<()> {
        let conn = self.lock_conn();
        conn.execute(
            &format!("INSERT INTO media_items ({MEDIA_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                m.id.map(|u| u.to_string()),
                m.kind,
                m.file_name,
                m.thumbnail_file_name,
                m.original_file_name,
                m.encryption_key_id,
                m.file_size,
                m.created_at.map(|t| t.timestamp_millis()),
                m.width,
                m.height,
                m.duration,
                m.record_id.map(|u| u.to_string()),
            ],
        )?;
        Ok(())
    }

    fn clear(&self, kind: RecordKind) -> StorageResult<()> {
        let conn = self.lock_conn();
        let sql = match kind {
            RecordKind::Category => "DELETE FROM categories; DELETE FROM record_categories;",
            RecordKind::Record => {
                "DELETE FROM records; DELETE FROM record_categories; \
                 UPDATE media_items SET record_id = NULL;"
            }
            RecordKind::MediaItem => "DELETE FROM media_items;",
        };
        conn.execute_batch(sql)?;
        debug!("cleared all {}", kind.as_str());
        Ok(())
    }

    fn link(&self, record_id: Uuid, category_id: Uuid) -> StorageResult<()> {
        let conn = self.lock_conn();
        Self::require(&conn, "records", "record", record_id)?;
        Self::require(&conn, "categories", "category", category_id)?;
        conn.execute(
            "INSERT OR IGNORE INTO record_categories (record_id, category_id) VALUES (?, ?)",
            params![record_id.to_string(), category_id.to_string()],
        )?;
        Ok(())
    }

    fn reparent(&self, category_id: Uuid, parent_id: Uuid) -> StorageResult<()> {
        let conn = self.lock_conn();
        Self::require(&conn, "categories", "category", category_id)?;
        Self::require(&conn, "categories", "category", parent_id)?;
        conn.execute(
            "UPDATE categories SET parent_id = ? WHERE id = ?",
            params![parent_id.to_string(), category_id.to_string()],
        )?;
        Ok(())
    }
}

fn uuid_col(row: &Row<'_>, idx: usize) -> duckdb::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw.and_then(|s| Uuid::parse_str(&s).ok()))
}

fn time_col(row: &Row<'_>, idx: usize) -> duckdb::Result<Option<DateTime<Utc>>> {
    let millis: Option<i64> = row.get(idx)?;
    Ok(millis.and_then(DateTime::from_timestamp_millis))
}

impl RecordStore for DuckRecordStore {
    fn fetch_categories(&self) -> StoreResult<Vec<Category>> {
        Ok(Self::read_categories(&self.lock_conn())?)
    }

    fn fetch_records(&self) -> StoreResult<Vec<Record>> {
        Ok(Self::read_records(&self.lock_conn())?)
    }

    fn fetch_media_items(&self) -> StoreResult<Vec<MediaItem>> {
        Ok(Self::read_media_items(&self.lock_conn())?)
    }

    fn fetch_record_categories(&self) -> StoreResult<Vec<RecordCategoryLink>> {
        Ok(Self::read_links(&self.lock_conn())?)
    }

    /// All four reads under one connection lock.
    fn snapshot(&self) -> StoreResult<StoreSnapshot> {
        let conn = self.lock_conn();
        Ok(StoreSnapshot {
            categories: Self::read_categories(&conn)?,
            records: Self::read_records(&conn)?,
            media_items: Self::read_media_items(&conn)?,
            links: Self::read_links(&conn)?,
        })
    }

    fn delete_all(&self, kind: RecordKind) -> StoreResult<()> {
        Ok(self.clear(kind)?)
    }

    fn create_category(&self, category: &Category) -> StoreResult<()> {
        Ok(self.insert_category(category)?)
    }

    fn create_record(&self, record: &Record) -> StoreResult<()> {
        Ok(self.insert_record(record)?)
    }

    fn create_media_item(&self, item: &MediaItem) -> StoreResult<()> {
        Ok(self.insert_media_item(item)?)
    }

    fn link_record_category(&self, record_id: Uuid, category_id: Uuid) -> StoreResult<()> {
        Ok(self.link(record_id, category_id)?)
    }

    fn set_category_parent(&self, category_id: Uuid, parent_id: Uuid) -> StoreResult<()> {
        Ok(self.reparent(category_id, parent_id)?)
    }

    fn save(&self) -> StoreResult<()> {
        let conn = self.lock_conn();
        conn.execute_batch("CHECKPOINT;").map_err(StorageError::from)?;
        Ok(())
    }
}

/// DuckDB keeps its log beside the database as `<file>.wal`.
fn wal_path(db: &Path) -> PathBuf {
    let mut wal = db.as_os_str().to_owned();
    wal.push(".wal");
    PathBuf::from(wal)
}
