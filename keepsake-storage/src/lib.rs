//! DuckDB storage layer for Keepsake.
//!
//! Implements the [`RecordStore`](keepsake_model::RecordStore) interface on
//! top of four plain tables (`categories`, `records`, `media_items`,
//! `record_categories`). Identifiers are stored as hyphenated UUID strings
//! and timestamps as Unix milliseconds; both are nullable because the
//! engine does not enforce them.

mod error;
mod record_store;

pub use error::{StorageError, StorageResult};
pub use record_store::DuckRecordStore;
