//! Typed entity operations against a [`DocumentStore`].
//!
//! Saves and merges of versioned entities go through the optimistic
//! concurrency protocol in `versioned`; everything else is a plain
//! store round trip with keys resolved through the entity's metadata.

use crate::codec::{self, DocumentCodec};
use crate::config::DatastoreConfig;
use crate::core::{Document, ID_KEY, Result};
use crate::mapping::{ClassDescriptor, Entity, MetadataRegistry};
use crate::store::{DocumentStore, Filter, UpdateOperations, WriteConcern};
use serde_json::Value;
use std::sync::Arc;

mod read_delete;
mod save_merge;
mod update;
mod versioned;

pub struct Datastore {
    store: Arc<dyn DocumentStore>,
    registry: Arc<MetadataRegistry>,
    codec: DocumentCodec,
    config: DatastoreConfig,
}

impl Datastore {
    /// Datastore over `store` using the process-wide metadata registry.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_config(store, DatastoreConfig::default())
    }

    pub fn with_config(store: Arc<dyn DocumentStore>, config: DatastoreConfig) -> Self {
        Self {
            store,
            registry: MetadataRegistry::global(),
            codec: DocumentCodec::new().store_nulls(config.store_nulls),
            config,
        }
    }

    pub fn with_registry(mut self, registry: Arc<MetadataRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    pub fn codec(&self) -> &DocumentCodec {
        &self.codec
    }

    pub fn config(&self) -> &DatastoreConfig {
        &self.config
    }

    pub fn describe<T: Entity>(&self) -> Result<Arc<ClassDescriptor>> {
        self.registry.describe::<T>()
    }

    /// Stored document shape of `entity`, without writing it.
    pub fn to_document<T: Entity>(&self, entity: &T) -> Result<Document> {
        let descriptor = self.describe::<T>()?;
        self.codec.encode(entity, &descriptor)
    }

    pub fn from_document<T: Entity>(&self, document: &Document) -> Result<T> {
        let descriptor = self.describe::<T>()?;
        self.codec.decode(document, &descriptor)
    }

    /// Non-null identity value of `entity`, if its type has an identity field.
    pub(crate) fn identity_of<T: Entity>(
        descriptor: &ClassDescriptor,
        entity: &T,
    ) -> Result<Option<Value>> {
        let Some(field) = descriptor.identity_field() else {
            return Ok(None);
        };
        Ok(entity
            .field_value(field.declared_name())?
            .filter(|value| !value.is_null()))
    }

    pub(crate) fn version_of<T: Entity>(
        descriptor: &ClassDescriptor,
        entity: &T,
    ) -> Result<Option<i64>> {
        let Some(field) = descriptor.version_field() else {
            return Ok(None);
        };
        codec::version_of(
            descriptor.type_name(),
            entity.field_value(field.declared_name())?,
        )
    }

    /// Explicit argument, then the entity's own concern, then the configured default.
    pub(crate) fn resolve_concern(
        &self,
        descriptor: &ClassDescriptor,
        explicit: Option<WriteConcern>,
    ) -> WriteConcern {
        explicit
            .or(descriptor.write_concern())
            .unwrap_or(self.config.default_write_concern)
    }

    pub(crate) fn resolve_filter(descriptor: &ClassDescriptor, filter: &Filter) -> Result<Filter> {
        filter.map_keys(|key| descriptor.resolve_storage_key(key))
    }

    pub(crate) fn resolve_update(
        descriptor: &ClassDescriptor,
        update: &UpdateOperations,
    ) -> Result<UpdateOperations> {
        update.map_keys(|key| descriptor.resolve_storage_key(key))
    }

    /// Encodes for a write and runs the bound pre-persist hook.
    pub(crate) fn encode_for_write<T: Entity>(
        &self,
        descriptor: &ClassDescriptor,
        entity: &T,
    ) -> Result<Document> {
        let mut document = self.codec.encode(entity, descriptor)?;
        if descriptor.lifecycle().pre_persist {
            entity.pre_persist(&mut document)?;
        }
        Ok(document)
    }

    pub(crate) fn after_write<T: Entity>(
        descriptor: &ClassDescriptor,
        entity: &T,
        document: &Document,
    ) -> Result<()> {
        if descriptor.lifecycle().post_persist {
            entity.post_persist(document)?;
        }
        Ok(())
    }

    /// Version-increment mutation appended to every filter-based update of a versioned type.
    pub(crate) fn with_version_increment(
        descriptor: &ClassDescriptor,
        mut update: UpdateOperations,
    ) -> UpdateOperations {
        if let Some(field) = descriptor.version_field() {
            update = update.inc(field.storage_key(), 1);
        }
        update
    }

    pub(crate) fn id_filter(id: &Value) -> Filter {
        Filter::new().eq(ID_KEY, id.clone())
    }
}
