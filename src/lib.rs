// ============================================================================
// rustodm Library
// ============================================================================

//! Typed entities mapped onto schemaless documents, with optimistic
//! concurrency control for versioned writes.
//!
//! # Examples
//!
//! ```
//! use rustodm::{Datastore, Entity, MemoryStore};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Entity)]
//! #[entity(collection = "counters")]
//! struct Counter {
//!     #[odm(id)]
//!     id: Option<String>,
//!     #[odm(version)]
//!     version: Option<i64>,
//!     value: i64,
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> rustodm::Result<()> {
//! let datastore = Datastore::new(Arc::new(MemoryStore::new()));
//! let id = datastore
//!     .save(&Counter { id: None, version: None, value: 1 })
//!     .await?;
//!
//! let stored: Counter = datastore.get(id).await?.unwrap();
//! assert_eq!(stored.version, Some(1));
//! # Ok(())
//! # }
//! ```

extern crate self as rustodm;

pub mod codec;
pub mod config;
pub mod core;
pub mod datastore;
pub mod mapping;
pub mod prelude;
pub mod store;

// Re-export main types for convenience
pub use codec::DocumentCodec;
pub use config::DatastoreConfig;
pub use crate::core::{Document, EntityKey, ID_KEY, Identity, OdmError, Result, USE_FIELD_NAME};
pub use datastore::Datastore;
pub use mapping::{
    Annotation, AnnotationKind, ClassDescriptor, ContainerFlags, EntityLifecycle, EntityMapping,
    FieldClassifier, FieldDescriptor, LifecycleBindings, MappedType, MappingWarning,
    MetadataRegistry, RawField, TypeInfo, ValidationHook, ValueArity,
};
pub use serde_json::Value;
pub use store::{
    Condition, DeleteResult, DocumentStore, Filter, MemoryStore, StoreError, StoreResult,
    UpdateOp, UpdateOperations, UpdateOptions, UpdateResult, WriteConcern, WriteOptions,
};

// Traits and their derives share a name, like serde's
pub use mapping::{Entity, Mapped};
pub use rustodm_derive::{Entity, Mapped};
