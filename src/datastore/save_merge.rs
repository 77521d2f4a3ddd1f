use super::Datastore;
use super::versioned::WriteOutcome;
use crate::core::{Document, ID_KEY, Identity, OdmError, Result};
use crate::mapping::{ClassDescriptor, Entity};
use crate::store::{UpdateOperations, UpdateOptions, WriteConcern, WriteOptions};
use serde_json::Value;
use tracing::{Instrument, Level, event, info_span};

impl Datastore {
    /// Saves `entity`, inserting it or replacing the stored document with the same identity.
    ///
    /// Versioned types go through the optimistic concurrency check and fail
    /// with [`OdmError::ConcurrentModification`] when the stored version
    /// moved on. The entity's own version field is not updated in memory;
    /// re-read it to observe the stored value.
    pub async fn save<T: Entity>(&self, entity: &T) -> Result<Identity> {
        self.save_with(entity, None).await
    }

    pub async fn save_with<T: Entity>(
        &self,
        entity: &T,
        concern: Option<WriteConcern>,
    ) -> Result<Identity> {
        let descriptor = self.describe::<T>()?;
        let span = info_span!(
            "odm.save",
            entity_type = %descriptor.type_name(),
            collection = %descriptor.collection_name()
        );
        async {
            let (outcome, mut document) = if descriptor.is_versioned() {
                let intent = self.prepare_versioned(&descriptor, entity)?;
                let document = intent.document.clone();
                (self.write_versioned(&descriptor, intent).await?, document)
            } else {
                let mut document = self.encode_for_write(&descriptor, entity)?;
                document.remove(ID_KEY);
                let options = WriteOptions::new().concern(self.resolve_concern(&descriptor, concern));
                let id = Self::identity_of(&descriptor, entity)?;
                let outcome = self
                    .save_document(descriptor.collection_name(), id, document.clone(), &options)
                    .await?;
                (outcome, document)
            };

            document.insert(ID_KEY.to_string(), outcome.id.clone());
            Self::after_write(&descriptor, entity, &document)?;
            event!(Level::DEBUG, identity = %outcome.id, "entity saved");
            Ok(Identity::from(outcome.id))
        }
        .instrument(span)
        .await
    }

    /// Saves each entity in order, stopping at the first failure.
    pub async fn save_many<T: Entity>(&self, entities: &[T]) -> Result<Vec<Identity>> {
        let mut identities = Vec::with_capacity(entities.len());
        for entity in entities {
            identities.push(self.save(entity).await?);
        }
        Ok(identities)
    }

    /// Plain insert: no version check, a duplicate identity is a store error.
    pub async fn insert<T: Entity>(&self, entity: &T) -> Result<Identity> {
        let descriptor = self.describe::<T>()?;
        let mut document = self.encode_for_write(&descriptor, entity)?;
        let options = WriteOptions::new().concern(self.resolve_concern(&descriptor, None));
        let id = self
            .store
            .insert_one(descriptor.collection_name(), document.clone(), &options)
            .await?;

        document.insert(ID_KEY.to_string(), id.clone());
        Self::after_write(&descriptor, entity, &document)?;
        event!(
            Level::DEBUG,
            collection = %descriptor.collection_name(),
            identity = %id,
            "entity inserted"
        );
        Ok(Identity::from(id))
    }

    pub async fn insert_many<T: Entity>(&self, entities: &[T]) -> Result<Vec<Identity>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let descriptor = self.describe::<T>()?;
        let documents = entities
            .iter()
            .map(|entity| self.encode_for_write(&descriptor, entity))
            .collect::<Result<Vec<_>>>()?;
        let options = WriteOptions::new().concern(self.resolve_concern(&descriptor, None));
        let ids = self
            .store
            .insert_many(descriptor.collection_name(), documents.clone(), &options)
            .await?;

        for ((entity, mut document), id) in entities.iter().zip(documents).zip(&ids) {
            document.insert(ID_KEY.to_string(), id.clone());
            Self::after_write(&descriptor, entity, &document)?;
        }
        event!(
            Level::DEBUG,
            collection = %descriptor.collection_name(),
            count = ids.len(),
            "entities inserted"
        );
        Ok(ids.into_iter().map(Identity::from).collect())
    }

    /// Writes the entity's fields onto its existing stored document.
    ///
    /// Requires an identity. Fails with [`OdmError::Update`] when the write
    /// had no effect, which covers both a missing target and a merge whose
    /// values equal what is stored.
    pub async fn merge<T: Entity>(&self, entity: &T) -> Result<()> {
        self.merge_with_concern(entity, None).await
    }

    pub async fn merge_with_concern<T: Entity>(
        &self,
        entity: &T,
        concern: Option<WriteConcern>,
    ) -> Result<()> {
        let descriptor = self.describe::<T>()?;
        let Some(id) = Self::identity_of(&descriptor, entity)? else {
            return Err(OdmError::Mapping(format!(
                "Could not get identity for {}",
                descriptor.type_name()
            )));
        };

        let span = info_span!(
            "odm.merge",
            entity_type = %descriptor.type_name(),
            identity = %id
        );
        async {
            let (outcome, mut document) = if descriptor.is_versioned() {
                let intent = self.prepare_versioned(&descriptor, entity)?;
                let document = intent.document.clone();
                (self.write_versioned(&descriptor, intent).await?, document)
            } else {
                self.merge_fields(&descriptor, entity, id, concern).await?
            };

            if !outcome.is_effective() {
                event!(Level::DEBUG, "merge matched nothing to change");
                return Err(OdmError::Update("Nothing updated".to_string()));
            }

            document.insert(ID_KEY.to_string(), outcome.id);
            Self::after_write(&descriptor, entity, &document)?;
            event!(Level::DEBUG, "entity merged");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Unversioned merge: `$set` of every encoded field, matched by identity, no upsert.
    async fn merge_fields<T: Entity>(
        &self,
        descriptor: &ClassDescriptor,
        entity: &T,
        id: Value,
        concern: Option<WriteConcern>,
    ) -> Result<(WriteOutcome, Document)> {
        let mut document = self.encode_for_write(descriptor, entity)?;
        document.remove(ID_KEY);
        let options = UpdateOptions::new()
            .upsert(false)
            .concern(self.resolve_concern(descriptor, concern));

        let result = self
            .store
            .update_one(
                descriptor.collection_name(),
                &Self::id_filter(&id),
                &UpdateOperations::set_all(document.clone()),
                &options,
            )
            .await?;
        Ok((WriteOutcome { id, result }, document))
    }
}
