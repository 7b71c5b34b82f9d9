//! The structured metadata embedded at the head of every backup container.
//!
//! Everything here is flat: DTOs carry their own identifier plus the
//! identifier of their parent/owner, and the many-to-many record ↔ category
//! relationship is a separate join list. This breaks the cycles of the live
//! object graph so the payload serializes as plain JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The only schema version this build writes and accepts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete backup metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPayload {
    pub backup_id: Uuid,
    pub app_version: String,
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub entity_stats: EntityStats,
    pub media_stats: MediaStats,
    pub has_broken_media: bool,
    pub broken_media_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_key_material: Option<KeyMaterial>,
    pub categories: Vec<CategoryDto>,
    pub records: Vec<RecordDto>,
    pub media_items: Vec<MediaItemDto>,
    pub relations: Vec<RecordCategoryRelation>,
    /// Blob order inside the container. Never reorder after writing.
    pub media_files: Vec<MediaFileDescriptor>,
}

impl BackupPayload {
    /// Creates an empty payload stamped with the current schema version.
    pub fn new(backup_id: Uuid, app_version: impl Into<String>) -> Self {
        Self {
            backup_id,
            app_version: app_version.into(),
            schema_version: SCHEMA_VERSION,
            created_at: Utc::now(),
            entity_stats: EntityStats::default(),
            media_stats: MediaStats::default(),
            has_broken_media: false,
            broken_media_count: 0,
            master_key_material: None,
            categories: Vec::new(),
            records: Vec::new(),
            media_items: Vec::new(),
            relations: Vec::new(),
            media_files: Vec::new(),
        }
    }

    /// Sum of all declared media blob lengths, `None` if it overflows u64.
    pub fn total_media_bytes(&self) -> Option<u64> {
        self.media_files
            .iter()
            .try_fold(0u64, |acc, f| acc.checked_add(f.byte_length))
    }

    /// Recomputes `entity_stats` and `media_stats` from the arrays.
    pub fn refresh_stats(&mut self) {
        self.entity_stats = EntityStats {
            category_count: self.categories.len(),
            record_count: self.records.len(),
            media_item_count: self.media_items.len(),
        };
        self.media_stats = MediaStats {
            total_files: self.media_files.len(),
            total_bytes: self.total_media_bytes().unwrap_or(u64::MAX),
        };
    }
}

/// Informational entity counts. Never used for control flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStats {
    pub category_count: usize,
    pub record_count: usize,
    pub media_item_count: usize,
}

/// Informational media totals. Never used for control flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaStats {
    pub total_files: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDto {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub name_en: Option<String>,
    #[serde(default)]
    pub color_hex: Option<String>,
    pub level: i16,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub icon_name: Option<String>,
    #[serde(default)]
    pub icon_type: Option<String>,
    #[serde(default, with = "crate::serde_bytes::option")]
    pub custom_icon_data: Option<Vec<u8>>,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDto {
    pub id: Uuid,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub plain_text_content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    pub is_deleted: bool,
    pub sync_status: i16,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub location_address: Option<String>,
    #[serde(default)]
    pub location_city: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub horizontal_accuracy: f64,
    pub vertical_accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItemDto {
    pub id: Uuid,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub thumbnail_file_name: Option<String>,
    #[serde(default)]
    pub original_file_name: Option<String>,
    #[serde(default)]
    pub encryption_key_id: Option<String>,
    #[serde(default)]
    pub file_size: i64,
    pub created_at: DateTime<Utc>,
    pub width: i32,
    pub height: i32,
    pub duration: f64,
    /// Owning record; may dangle.
    #[serde(default)]
    pub record_id: Option<Uuid>,
}

/// A (record, category) membership pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCategoryRelation {
    pub record_id: Uuid,
    pub category_id: Uuid,
}

/// Location and size of one media blob.
///
/// `relative_path` is always `/`-separated and relative to the media root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFileDescriptor {
    pub relative_path: String,
    pub byte_length: u64,
}

impl MediaFileDescriptor {
    pub fn new(relative_path: impl Into<String>, byte_length: u64) -> Self {
        Self {
            relative_path: relative_path.into(),
            byte_length,
        }
    }
}

/// Secret key bytes carried in the payload. Zeroized on drop and never
/// printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyMaterial(#[serde(with = "crate::serde_bytes")] Vec<u8>);

impl KeyMaterial {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial([REDACTED; {}])", self.0.len())
    }
}
