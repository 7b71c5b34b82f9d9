//! Persistence engine interface and an in-memory implementation.

use crate::entity::{Category, MediaItem, Record, RecordCategoryLink, RecordKind};
use crate::error::{StoreError, StoreResult};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Everything the exporter reads, captured in one pass.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub categories: Vec<Category>,
    pub records: Vec<Record>,
    pub media_items: Vec<MediaItem>,
    pub links: Vec<RecordCategoryLink>,
}

/// The structured-record persistence engine as seen by migration.
///
/// Creation methods take entities with their relationship fields as given;
/// the importer is responsible for deciding which links are resolvable and
/// clears the ones that are not before calling in.
pub trait RecordStore: Send + Sync {
    fn fetch_categories(&self) -> StoreResult<Vec<Category>>;
    fn fetch_records(&self) -> StoreResult<Vec<Record>>;
    fn fetch_media_items(&self) -> StoreResult<Vec<MediaItem>>;
    fn fetch_record_categories(&self) -> StoreResult<Vec<RecordCategoryLink>>;

    /// Reads every kind in one consistent pass.
    ///
    /// The default runs the four fetches back to back; backends that can
    /// hold a lock or transaction across them should override it.
    fn snapshot(&self) -> StoreResult<StoreSnapshot> {
        Ok(StoreSnapshot {
            categories: self.fetch_categories()?,
            records: self.fetch_records()?,
            media_items: self.fetch_media_items()?,
            links: self.fetch_record_categories()?,
        })
    }

    /// Deletes every entity of `kind` together with the links that touch it.
    fn delete_all(&self, kind: RecordKind) -> StoreResult<()>;

    fn create_category(&self, category: &Category) -> StoreResult<()>;
    fn create_record(&self, record: &Record) -> StoreResult<()>;
    fn create_media_item(&self, item: &MediaItem) -> StoreResult<()>;

    /// Adds `record_id` to `category_id`. Both must exist.
    fn link_record_category(&self, record_id: Uuid, category_id: Uuid) -> StoreResult<()>;

    /// Points `category_id` at `parent_id`. Both must exist.
    fn set_category_parent(&self, category_id: Uuid, parent_id: Uuid) -> StoreResult<()>;

    /// Makes pending changes durable.
    fn save(&self) -> StoreResult<()>;
}

#[derive(Default)]
struct MemoryState {
    categories: Vec<Category>,
    records: Vec<Record>,
    media_items: Vec<MediaItem>,
    links: BTreeSet<RecordCategoryLink>,
    saves: usize,
}

/// `RecordStore` held entirely in memory. Changes apply immediately;
/// `save()` only counts calls.
#[derive(Default)]
pub struct MemoryRecordStore {
    state: Mutex<MemoryState>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Number of times `save()` has been called.
    pub fn save_count(&self) -> usize {
        self.lock().map(|s| s.saves).unwrap_or(0)
    }

    /// Looks up a category by id.
    pub fn category(&self, id: Uuid) -> Option<Category> {
        let state = self.lock().ok()?;
        state.categories.iter().find(|c| c.id == Some(id)).cloned()
    }

    /// Looks up a media item by id.
    pub fn media_item(&self, id: Uuid) -> Option<MediaItem> {
        let state = self.lock().ok()?;
        state.media_items.iter().find(|m| m.id == Some(id)).cloned()
    }

    /// Category ids linked to a record.
    pub fn categories_of(&self, record_id: Uuid) -> Vec<Uuid> {
        self.lock()
            .map(|s| {
                s.links
                    .iter()
                    .filter(|l| l.record_id == record_id)
                    .map(|l| l.category_id)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn fetch_categories(&self) -> StoreResult<Vec<Category>> {
        Ok(self.lock()?.categories.clone())
    }

    fn fetch_records(&self) -> StoreResult<Vec<Record>> {
        Ok(self.lock()?.records.clone())
    }

    fn fetch_media_items(&self) -> StoreResult<Vec<MediaItem>> {
        Ok(self.lock()?.media_items.clone())
    }

    fn fetch_record_categories(&self) -> StoreResult<Vec<RecordCategoryLink>> {
        Ok(self.lock()?.links.iter().copied().collect())
    }

    fn snapshot(&self) -> StoreResult<StoreSnapshot> {
        let state = self.lock()?;
        Ok(StoreSnapshot {
            categories: state.categories.clone(),
            records: state.records.clone(),
            media_items: state.media_items.clone(),
            links: state.links.iter().copied().collect(),
        })
    }

    fn delete_all(&self, kind: RecordKind) -> StoreResult<()> {
        let mut state = self.lock()?;
        match kind {
            RecordKind::Category => {
                state.categories.clear();
                state.links.clear();
            }
            RecordKind::Record => {
                state.records.clear();
                state.links.clear();
                for item in state.media_items.iter_mut() {
                    item.record_id = None;
                }
            }
            RecordKind::MediaItem => state.media_items.clear(),
        }
        Ok(())
    }

    fn create_category(&self, category: &Category) -> StoreResult<()> {
        self.lock()?.categories.push(category.clone());
        Ok(())
    }

    fn create_record(&self, record: &Record) -> StoreResult<()> {
        self.lock()?.records.push(record.clone());
        Ok(())
    }

    fn create_media_item(&self, item: &MediaItem) -> StoreResult<()> {
        self.lock()?.media_items.push(item.clone());
        Ok(())
    }

    fn link_record_category(&self, record_id: Uuid, category_id: Uuid) -> StoreResult<()> {
        let mut state = self.lock()?;
        if !state.records.iter().any(|r| r.id == Some(record_id)) {
            return Err(StoreError::NotFound(format!("record {record_id}")));
        }
        if !state.categories.iter().any(|c| c.id == Some(category_id)) {
            return Err(StoreError::NotFound(format!("category {category_id}")));
        }
        state.links.insert(RecordCategoryLink {
            record_id,
            category_id,
        });
        Ok(())
    }

    fn set_category_parent(&self, category_id: Uuid, parent_id: Uuid) -> StoreResult<()> {
        let mut state = self.lock()?;
        if !state.categories.iter().any(|c| c.id == Some(parent_id)) {
            return Err(StoreError::NotFound(format!("category {parent_id}")));
        }
        let child = state
            .categories
            .iter_mut()
            .find(|c| c.id == Some(category_id))
            .ok_or_else(|| StoreError::NotFound(format!("category {category_id}")))?;
        child.parent_id = Some(parent_id);
        Ok(())
    }

    fn save(&self) -> StoreResult<()> {
        self.lock()?.saves += 1;
        Ok(())
    }
}
