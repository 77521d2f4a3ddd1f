use super::Datastore;
use crate::core::{EntityKey, ID_KEY, Identity, OdmError, Result};
use crate::mapping::Entity;
use crate::store::{DeleteResult, Filter, WriteConcern, WriteOptions};
use tracing::{Level, event};

impl Datastore {
    pub async fn get<T: Entity>(&self, id: impl Into<Identity>) -> Result<Option<T>> {
        let id: Identity = id.into();
        Ok(self
            .find::<T>(&Filter::by_id(id.into_value()), Some(1))
            .await?
            .into_iter()
            .next())
    }

    /// Loads the entities with the given identities; missing ones are skipped.
    pub async fn get_many<T, I>(&self, ids: I) -> Result<Vec<T>>
    where
        T: Entity,
        I: IntoIterator,
        I::Item: Into<Identity>,
    {
        let ids: Vec<_> = ids
            .into_iter()
            .map(|id| Into::<Identity>::into(id).into_value())
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.find::<T>(&Filter::new().is_in(ID_KEY, ids), None).await
    }

    pub async fn find<T: Entity>(&self, filter: &Filter, limit: Option<usize>) -> Result<Vec<T>> {
        let descriptor = self.describe::<T>()?;
        let filter = Self::resolve_filter(&descriptor, filter)?;
        let documents = self
            .store
            .find(descriptor.collection_name(), &filter, limit)
            .await?;
        event!(
            Level::TRACE,
            collection = %descriptor.collection_name(),
            count = documents.len(),
            "documents loaded"
        );
        documents
            .iter()
            .map(|document| self.codec.decode(document, &descriptor))
            .collect()
    }

    pub async fn find_one<T: Entity>(&self, filter: &Filter) -> Result<Option<T>> {
        Ok(self.find::<T>(filter, Some(1)).await?.into_iter().next())
    }

    pub async fn exists<T: Entity>(&self, id: impl Into<Identity>) -> Result<bool> {
        let id: Identity = id.into();
        let filter = Filter::by_id(id.into_value());
        Ok(self.count::<T>(&filter).await? > 0)
    }

    pub async fn count<T: Entity>(&self, filter: &Filter) -> Result<u64> {
        let descriptor = self.describe::<T>()?;
        let filter = Self::resolve_filter(&descriptor, filter)?;
        Ok(self
            .store
            .count(descriptor.collection_name(), &filter)
            .await?)
    }

    pub async fn delete_by_id<T: Entity>(&self, id: impl Into<Identity>) -> Result<DeleteResult> {
        let id: Identity = id.into();
        self.delete_by_filter::<T>(&Filter::by_id(id.into_value()), None)
            .await
    }

    /// Deletes the stored document of `entity`; it must carry an identity.
    pub async fn delete_entity<T: Entity>(&self, entity: &T) -> Result<DeleteResult> {
        let descriptor = self.describe::<T>()?;
        let Some(id) = Self::identity_of(&descriptor, entity)? else {
            return Err(OdmError::Mapping(format!(
                "Could not get identity for {}",
                descriptor.type_name()
            )));
        };
        self.delete_by_filter::<T>(&Self::id_filter(&id), None).await
    }

    pub async fn delete_by_filter<T: Entity>(
        &self,
        filter: &Filter,
        concern: Option<WriteConcern>,
    ) -> Result<DeleteResult> {
        let descriptor = self.describe::<T>()?;
        let filter = Self::resolve_filter(&descriptor, filter)?;
        let options = WriteOptions::new().concern(self.resolve_concern(&descriptor, concern));
        let result = self
            .store
            .delete_many(descriptor.collection_name(), &filter, &options)
            .await?;
        event!(
            Level::DEBUG,
            collection = %descriptor.collection_name(),
            deleted = result.deleted_count,
            "documents deleted"
        );
        Ok(result)
    }

    /// Collection and identity of `entity`, if it has been given one.
    pub fn key_of<T: Entity>(&self, entity: &T) -> Result<Option<EntityKey>> {
        let descriptor = self.describe::<T>()?;
        Ok(Self::identity_of(&descriptor, entity)?
            .map(|id| EntityKey::new(descriptor.collection_name(), Identity::from(id))))
    }
}
