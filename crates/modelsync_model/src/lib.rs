//! # modelsync model
//!
//! Value types shared by every modelsync crate.
//!
//! This crate provides:
//! - [`Value`], a tagged field value (`string|int|double|bool|timestamp|null|nested`)
//! - [`Record`], a type-erased model instance addressed by a [`RecordId`]
//! - [`RemoteRecord`], a record paired with its server-side sync fields
//! - [`ModelSchema`] and [`SchemaCatalog`], the static model registry
//! - [`SyncMetadataRecord`] and [`MutationSyncMetadata`], the persisted bookkeeping
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod error;
mod metadata;
mod record;
mod schema;
mod value;

pub use catalog::SchemaCatalog;
pub use error::{ModelError, ModelResult};
pub use metadata::{MutationSyncMetadata, SyncMetadataRecord};
pub use record::{Record, RecordId, RemoteRecord};
pub use schema::{Association, AssociationKind, Field, FieldType, ModelSchema};
pub use value::Value;
