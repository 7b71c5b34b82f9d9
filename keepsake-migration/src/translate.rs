//! Entity ↔ DTO translation.
//!
//! Export direction drops rows missing a required identity or timestamp.
//! Import direction always succeeds; relationship fields are cleared here and
//! re-established by the importer once both endpoints exist.

use keepsake_model::{
    Category, CategoryDto, MediaItem, MediaItemDto, Record, RecordCategoryRelation, RecordDto,
    StoreSnapshot,
};
use std::collections::HashSet;
use tracing::warn;
use uuid::Uuid;

/// Rows skipped during export because they lacked identity or timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DroppedCounts {
    pub categories: usize,
    pub records: usize,
    pub media_items: usize,
}

impl DroppedCounts {
    pub fn total(&self) -> usize {
        self.categories + self.records + self.media_items
    }
}

/// DTO arrays ready to be placed in a payload.
#[derive(Debug, Default)]
pub struct Translated {
    pub categories: Vec<CategoryDto>,
    pub records: Vec<RecordDto>,
    pub media_items: Vec<MediaItemDto>,
    pub relations: Vec<RecordCategoryRelation>,
    pub dropped: DroppedCounts,
}

pub fn category_to_dto(c: &Category) -> Option<CategoryDto> {
    Some(CategoryDto {
        id: c.id?,
        name: c.name.clone().unwrap_or_default(),
        name_en: c.name_en.clone(),
        color_hex: c.color_hex.clone(),
        level: c.level,
        sort_order: c.sort_order,
        created_at: c.created_at?,
        icon_name: c.icon_name.clone(),
        icon_type: c.icon_type.clone(),
        custom_icon_data: c.custom_icon_data.clone(),
        parent_id: c.parent_id,
    })
}

pub fn record_to_dto(r: &Record) -> Option<RecordDto> {
    Some(RecordDto {
        id: r.id?,
        title: r.title.clone(),
        content: r.content.clone(),
        plain_text_content: r.plain_text_content.clone(),
        created_at: r.created_at?,
        updated_at: r.updated_at?,
        timestamp: r.timestamp?,
        is_deleted: r.is_deleted,
        sync_status: r.sync_status,
        mood: r.mood.clone(),
        location_name: r.location_name.clone(),
        location_address: r.location_address.clone(),
        location_city: r.location_city.clone(),
        latitude: r.latitude,
        longitude: r.longitude,
        horizontal_accuracy: r.horizontal_accuracy,
        vertical_accuracy: r.vertical_accuracy,
    })
}

pub fn media_item_to_dto(m: &MediaItem) -> Option<MediaItemDto> {
    Some(MediaItemDto {
        id: m.id?,
        kind: m.kind.clone(),
        file_name: m.file_name.clone(),
        thumbnail_file_name: m.thumbnail_file_name.clone(),
        original_file_name: m.original_file_name.clone(),
        encryption_key_id: m.encryption_key_id.clone(),
        file_size: m.file_size,
        created_at: m.created_at?,
        width: m.width,
        height: m.height,
        duration: m.duration,
        record_id: m.record_id,
    })
}

/// Translates a store snapshot. Relations are kept only for records that
/// survived translation; a relation may still name a dropped category.
pub fn translate_snapshot(snapshot: &StoreSnapshot) -> Translated {
    let mut out = Translated::default();

    for c in &snapshot.categories {
        match category_to_dto(c) {
            Some(dto) => out.categories.push(dto),
            None => out.dropped.categories += 1,
        }
    }
    for r in &snapshot.records {
        match record_to_dto(r) {
            Some(dto) => out.records.push(dto),
            None => out.dropped.records += 1,
        }
    }
    for m in &snapshot.media_items {
        match media_item_to_dto(m) {
            Some(dto) => out.media_items.push(dto),
            None => out.dropped.media_items += 1,
        }
    }

    let exported: HashSet<Uuid> = out.records.iter().map(|r| r.id).collect();
    out.relations = snapshot
        .links
        .iter()
        .filter(|l| exported.contains(&l.record_id))
        .map(|l| RecordCategoryRelation {
            record_id: l.record_id,
            category_id: l.category_id,
        })
        .collect();

    if out.dropped.total() > 0 {
        warn!(
            "dropped entities without identity or timestamps: {} categories, {} records, {} media items",
            out.dropped.categories, out.dropped.records, out.dropped.media_items
        );
    }
    out
}

/// Category without its parent; the importer links parents in a final sweep.
pub fn category_from_dto(dto: &CategoryDto) -> Category {
    Category {
        id: Some(dto.id),
        name: Some(dto.name.clone()),
        name_en: dto.name_en.clone(),
        color_hex: dto.color_hex.clone(),
        level: dto.level,
        sort_order: dto.sort_order,
        created_at: Some(dto.created_at),
        icon_name: dto.icon_name.clone(),
        icon_type: dto.icon_type.clone(),
        custom_icon_data: dto.custom_icon_data.clone(),
        parent_id: None,
    }
}

pub fn record_from_dto(dto: &RecordDto) -> Record {
    Record {
        id: Some(dto.id),
        title: dto.title.clone(),
        content: dto.content.clone(),
        plain_text_content: dto.plain_text_content.clone(),
        created_at: Some(dto.created_at),
        updated_at: Some(dto.updated_at),
        timestamp: Some(dto.timestamp),
        is_deleted: dto.is_deleted,
        sync_status: dto.sync_status,
        mood: dto.mood.clone(),
        location_name: dto.location_name.clone(),
        location_address: dto.location_address.clone(),
        location_city: dto.location_city.clone(),
        latitude: dto.latitude,
        longitude: dto.longitude,
        horizontal_accuracy: dto.horizontal_accuracy,
        vertical_accuracy: dto.vertical_accuracy,
    }
}

/// Media item owned by `owner`, which the caller has already resolved.
pub fn media_item_from_dto(dto: &MediaItemDto, owner: Option<Uuid>) -> MediaItem {
    MediaItem {
        id: Some(dto.id),
        kind: dto.kind.clone(),
        file_name: dto.file_name.clone(),
        thumbnail_file_name: dto.thumbnail_file_name.clone(),
        original_file_name: dto.original_file_name.clone(),
        encryption_key_id: dto.encryption_key_id.clone(),
        file_size: dto.file_size,
        created_at: Some(dto.created_at),
        width: dto.width,
        height: dto.height,
        duration: dto.duration,
        record_id: owner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use keepsake_model::RecordCategoryLink;

    #[test]
    fn record_needs_all_three_timestamps() {
        let now = Utc::now();
        let mut r = Record {
            id: Some(Uuid::new_v4()),
            created_at: Some(now),
            updated_at: Some(now),
            timestamp: None,
            ..Default::default()
        };
        assert!(record_to_dto(&r).is_none());
        r.timestamp = Some(now);
        assert!(record_to_dto(&r).is_some());
    }

    #[test]
    fn missing_category_name_becomes_empty() {
        let c = Category {
            id: Some(Uuid::new_v4()),
            created_at: Some(Utc::now()),
            ..Default::default()
        };
        assert_eq!(category_to_dto(&c).unwrap().name, "");
    }

    #[test]
    fn relations_follow_surviving_records() {
        let now = Utc::now();
        let kept = Uuid::new_v4();
        let dropped = Uuid::new_v4();
        let cat = Uuid::new_v4();
        let snapshot = StoreSnapshot {
            records: vec![
                Record {
                    id: Some(kept),
                    created_at: Some(now),
                    updated_at: Some(now),
                    timestamp: Some(now),
                    ..Default::default()
                },
                Record {
                    id: Some(dropped),
                    ..Default::default()
                },
            ],
            links: vec![
                RecordCategoryLink {
                    record_id: kept,
                    category_id: cat,
                },
                RecordCategoryLink {
                    record_id: dropped,
                    category_id: cat,
                },
            ],
            ..Default::default()
        };

        let t = translate_snapshot(&snapshot);
        assert_eq!(t.records.len(), 1);
        assert_eq!(t.dropped.records, 1);
        assert_eq!(t.relations.len(), 1);
        assert_eq!(t.relations[0].record_id, kept);
    }
}
