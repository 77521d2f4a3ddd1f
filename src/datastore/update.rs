use super::Datastore;
use crate::core::{ID_KEY, OdmError, Result};
use crate::mapping::Entity;
use crate::store::{Filter, UpdateOperations, UpdateOptions, UpdateResult, WriteConcern};
use tracing::{Level, event};

impl Datastore {
    /// Applies `update` to every `T` document matching `filter`.
    ///
    /// Keys may be declared field names or storage keys. Versioned types
    /// always get their version incremented, but no version is checked:
    /// this path can overtake a concurrent versioned save.
    pub async fn update_by_filter<T: Entity>(
        &self,
        filter: &Filter,
        update: UpdateOperations,
        options: UpdateOptions,
    ) -> Result<UpdateResult> {
        let descriptor = self.describe::<T>()?;
        let filter = Self::resolve_filter(&descriptor, filter)?;
        let update = Self::with_version_increment(
            &descriptor,
            Self::resolve_update(&descriptor, &update)?,
        );
        let options = match options.concern {
            Some(_) => options,
            None => {
                let concern = self.resolve_concern(&descriptor, None);
                options.concern(concern)
            }
        };

        let result = self
            .store
            .update_many(descriptor.collection_name(), &filter, &update, &options)
            .await?;
        event!(
            Level::DEBUG,
            collection = %descriptor.collection_name(),
            matched = result.matched_count,
            modified = result.modified_count,
            "bulk update applied"
        );
        Ok(result)
    }

    /// Updates the stored document of `entity`, scoped to its identity and,
    /// when versioned, the version it currently carries.
    ///
    /// A moved-on version shows up as `matched_count == 0`, not as an error.
    pub async fn update_entity<T: Entity>(
        &self,
        entity: &T,
        update: UpdateOperations,
        concern: Option<WriteConcern>,
    ) -> Result<UpdateResult> {
        let descriptor = self.describe::<T>()?;
        let Some(id) = Self::identity_of(&descriptor, entity)? else {
            return Err(OdmError::Mapping(format!(
                "Could not get identity for {}",
                descriptor.type_name()
            )));
        };

        let mut filter = Filter::new().eq(ID_KEY, id);
        if let Some(field) = descriptor.version_field() {
            let version = Self::version_of(&descriptor, entity)?;
            filter = filter.eq(field.storage_key(), version);
        }

        let update = Self::with_version_increment(
            &descriptor,
            Self::resolve_update(&descriptor, &update)?,
        );
        let options = UpdateOptions::new().concern(self.resolve_concern(&descriptor, concern));
        let result = self
            .store
            .update_one(descriptor.collection_name(), &filter, &update, &options)
            .await?;
        event!(
            Level::DEBUG,
            collection = %descriptor.collection_name(),
            matched = result.matched_count,
            modified = result.modified_count,
            "entity update applied"
        );
        Ok(result)
    }

    /// Atomically updates the first matching document and decodes it.
    ///
    /// Returns the document as it is after the update when `return_new`
    /// is set, otherwise as it was before. `None` when nothing matched.
    pub async fn find_and_modify<T: Entity>(
        &self,
        filter: &Filter,
        update: UpdateOperations,
        return_new: bool,
    ) -> Result<Option<T>> {
        let descriptor = self.describe::<T>()?;
        let filter = Self::resolve_filter(&descriptor, filter)?;
        let update = Self::with_version_increment(
            &descriptor,
            Self::resolve_update(&descriptor, &update)?,
        );

        let Some(document) = self
            .store
            .find_one_and_update(descriptor.collection_name(), &filter, &update, return_new)
            .await?
        else {
            return Ok(None);
        };
        event!(
            Level::DEBUG,
            collection = %descriptor.collection_name(),
            "find and modify applied"
        );
        self.codec.decode(&document, &descriptor).map(Some)
    }
}
