//! Everything application code usually needs in one import.
//!
//! ```
//! use rustodm::prelude::*;
//! ```

pub use crate::{
    Datastore, DatastoreConfig, DocumentStore, Entity, EntityLifecycle, Filter, Identity,
    Mapped, MemoryStore, OdmError, Result, UpdateOperations, UpdateOptions, WriteConcern,
};
