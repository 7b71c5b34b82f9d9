//! Entities as stored by the persistence engine.
//!
//! Relationships are carried as identifiers (`parent_id`, `record_id`,
//! `RecordCategoryLink`) so the same structs serve both the engine adapter
//! and the in-memory store. Identity and timestamps are `Option` because the
//! engine may hold rows without them; the exporter drops such rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kinds of structured record the engine holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Category,
    Record,
    MediaItem,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Category => "category",
            RecordKind::Record => "record",
            RecordKind::MediaItem => "media_item",
        }
    }
}

/// A node in the category tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Category {
    pub id: Option<Uuid>,
    pub name: Option<String>,
    pub name_en: Option<String>,
    pub color_hex: Option<String>,
    pub level: i16,
    pub sort_order: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub icon_name: Option<String>,
    pub icon_type: Option<String>,
    pub custom_icon_data: Option<Vec<u8>>,
    pub parent_id: Option<Uuid>,
}

/// A journal record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub id: Option<Uuid>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub plain_text_content: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub timestamp: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub sync_status: i16,
    pub mood: Option<String>,
    pub location_name: Option<String>,
    pub location_address: Option<String>,
    pub location_city: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub horizontal_accuracy: f64,
    pub vertical_accuracy: f64,
}

/// Metadata for an image or video attached to a record.
///
/// `file_name` and `thumbnail_file_name` name files under the media root;
/// the bytes themselves are carried separately in the container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaItem {
    pub id: Option<Uuid>,
    pub kind: Option<String>,
    pub file_name: Option<String>,
    pub thumbnail_file_name: Option<String>,
    pub original_file_name: Option<String>,
    pub encryption_key_id: Option<String>,
    pub file_size: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub width: i32,
    pub height: i32,
    pub duration: f64,
    /// Owning record.
    pub record_id: Option<Uuid>,
}

/// One edge of the record ↔ category many-to-many relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordCategoryLink {
    pub record_id: Uuid,
    pub category_id: Uuid,
}
