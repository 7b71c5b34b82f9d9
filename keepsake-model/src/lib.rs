//! Data model for Keepsake device-to-device migration.
//!
//! Three layers live here:
//!
//! - **Entities** (`entity`): the records as the persistence engine hands
//!   them out. Identity and timestamp fields are optional because the engine
//!   does not enforce them.
//! - **Payload** (`payload`): the flat, relationship-free DTOs that travel
//!   inside a backup container. Relationships are expressed as identifier
//!   pairs, never as live references.
//! - **Interfaces** (`store`, `credentials`): the injected capabilities the
//!   exporter and importer consume, plus in-memory implementations.

pub mod credentials;
pub mod entity;
mod error;
pub mod payload;
mod serde_bytes;
pub mod store;

pub use credentials::{CredentialStore, MemoryCredentialStore, MASTER_KEY_NAME};
pub use entity::{Category, MediaItem, Record, RecordCategoryLink, RecordKind};
pub use error::{ErrorKind, StoreError, StoreResult};
pub use payload::{
    BackupPayload, CategoryDto, EntityStats, KeyMaterial, MediaFileDescriptor, MediaItemDto,
    MediaStats, RecordCategoryRelation, RecordDto, SCHEMA_VERSION,
};
pub use store::{MemoryRecordStore, RecordStore, StoreSnapshot};
