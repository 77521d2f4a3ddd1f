use super::Datastore;
use crate::core::{Document, ID_KEY, Identity, OdmError, Result};
use crate::mapping::{ClassDescriptor, Entity};
use crate::store::{Filter, UpdateResult, WriteConcern, WriteOptions};
use serde_json::Value;
use tracing::{Level, event};

/// Payload of one versioned write, computed from the entity before any round trip.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WriteIntent {
    pub id: Option<Value>,
    pub previous_version: Option<i64>,
    pub new_version: i64,
    /// Encoded entity without `_id`, version key set to `new_version`.
    pub document: Document,
}

impl WriteIntent {
    /// Expected version of a conditional write, or `None` for a first write.
    pub fn expected_version(&self) -> Option<i64> {
        match (&self.id, self.previous_version) {
            (Some(_), Some(previous)) if self.new_version != 1 => Some(previous),
            _ => None,
        }
    }
}

/// Identity a write landed on, with the store's counts.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WriteOutcome {
    pub id: Value,
    pub result: UpdateResult,
}

impl WriteOutcome {
    /// A replace that changed nothing reports zero here, same as a vanished target.
    pub fn is_effective(&self) -> bool {
        self.result.modified_count > 0 || self.result.upserted_id.is_some()
    }
}

impl Datastore {
    pub(crate) fn prepare_versioned<T: Entity>(
        &self,
        descriptor: &ClassDescriptor,
        entity: &T,
    ) -> Result<WriteIntent> {
        let version_field = descriptor.version_field().ok_or_else(|| {
            OdmError::Mapping(format!("{} has no version field", descriptor.type_name()))
        })?;

        let previous_version = Self::version_of(descriptor, entity)?;
        let new_version = match previous_version {
            Some(previous) => previous.checked_add(1).ok_or_else(|| {
                OdmError::Mapping(format!(
                    "Version of {} overflowed at {previous}",
                    descriptor.type_name()
                ))
            })?,
            None => 1,
        };

        let mut document = self.encode_for_write(descriptor, entity)?;
        document.remove(ID_KEY);
        document.insert(
            version_field.storage_key().to_string(),
            Value::from(new_version),
        );

        Ok(WriteIntent {
            id: Self::identity_of(descriptor, entity)?,
            previous_version,
            new_version,
            document,
        })
    }

    /// Runs the compare-and-swap write for `intent`.
    ///
    /// Never retried: a version mismatch surfaces as
    /// [`OdmError::ConcurrentModification`].
    pub(crate) async fn write_versioned(
        &self,
        descriptor: &ClassDescriptor,
        intent: WriteIntent,
    ) -> Result<WriteOutcome> {
        let collection = descriptor.collection_name();
        let options = WriteOptions::new().concern(WriteConcern::Acknowledged);

        let (Some(id), Some(expected)) = (intent.id.clone(), intent.expected_version()) else {
            event!(
                Level::DEBUG,
                collection = %collection,
                version = intent.new_version,
                "versioned first write"
            );
            return self
                .save_document(collection, intent.id, intent.document, &options)
                .await;
        };

        let version_key = descriptor
            .version_field()
            .map(|field| field.storage_key().to_string())
            .ok_or_else(|| {
                OdmError::Mapping(format!("{} has no version field", descriptor.type_name()))
            })?;
        let filter = Filter::new()
            .eq(ID_KEY, id.clone())
            .eq(version_key, expected);

        let result = self
            .store
            .replace_one(collection, &filter, intent.document, false, &options)
            .await?;

        match result.modified_count {
            1 => {
                event!(
                    Level::DEBUG,
                    collection = %collection,
                    identity = %id,
                    from = expected,
                    to = intent.new_version,
                    "versioned write applied"
                );
                Ok(WriteOutcome { id, result })
            }
            0 => {
                event!(
                    Level::DEBUG,
                    collection = %collection,
                    identity = %id,
                    expected_version = expected,
                    "versioned write lost the race"
                );
                Err(OdmError::ConcurrentModification {
                    type_name: descriptor.type_name().to_string(),
                    identity: Identity::from(id).to_string(),
                    expected_version: expected,
                })
            }
            other => {
                event!(
                    Level::ERROR,
                    collection = %collection,
                    identity = %id,
                    modified = other,
                    "conditional replace matched more than one document"
                );
                Err(OdmError::ProtocolViolation(format!(
                    "conditional replace of {} '{}' modified {other} documents",
                    descriptor.type_name(),
                    Identity::from(id)
                )))
            }
        }
    }

    /// Insert when `id` is absent, else replace-or-insert by identity.
    pub(crate) async fn save_document(
        &self,
        collection: &str,
        id: Option<Value>,
        mut document: Document,
        options: &WriteOptions,
    ) -> Result<WriteOutcome> {
        match id {
            None => {
                let id = self.store.insert_one(collection, document, options).await?;
                Ok(WriteOutcome {
                    result: UpdateResult {
                        matched_count: 0,
                        modified_count: 0,
                        upserted_id: Some(id.clone()),
                    },
                    id,
                })
            }
            Some(id) => {
                document.insert(ID_KEY.to_string(), id.clone());
                let result = self
                    .store
                    .replace_one(collection, &Self::id_filter(&id), document, true, options)
                    .await?;
                Ok(WriteOutcome { id, result })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{Annotation, EntityMapping, Mapped, MappedType, MetadataRegistry, RawField};
    use crate::store::{
        DeleteResult, DocumentStore, StoreError, StoreResult, UpdateOperations, UpdateOptions,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct Ticket {
        id: String,
        version: i64,
    }

    impl Mapped for Ticket {
        fn raw_fields() -> Vec<RawField> {
            vec![
                RawField::new("id", "Ticket", String::type_info()).with_annotation(Annotation::Id),
                RawField::new("version", "Ticket", i64::type_info())
                    .with_annotation(Annotation::version()),
            ]
        }

        fn write_fields(&self, out: &mut Document) -> Result<()> {
            out.insert("id".to_string(), json!(self.id));
            out.insert("version".to_string(), json!(self.version));
            Ok(())
        }

        fn read_fields(_values: &mut Document) -> Result<Self> {
            Err(OdmError::Codec("tickets are write-only here".to_string()))
        }

        fn field_value(&self, declared_name: &str) -> Result<Option<Value>> {
            Ok(match declared_name {
                "id" => Some(json!(self.id)),
                "version" => Some(json!(self.version)),
                _ => None,
            })
        }
    }

    impl Entity for Ticket {
        fn entity_mapping() -> EntityMapping {
            EntityMapping::new("Ticket", Self::raw_fields())
        }
    }

    /// Driver whose conditional replace claims to have touched two documents.
    struct OvercountingStore;

    fn unsupported<T>() -> StoreResult<T> {
        Err(StoreError::Internal("unsupported".to_string()))
    }

    #[async_trait]
    impl DocumentStore for OvercountingStore {
        async fn insert_one(
            &self,
            _collection: &str,
            _document: Document,
            _options: &WriteOptions,
        ) -> StoreResult<Value> {
            unsupported()
        }

        async fn insert_many(
            &self,
            _collection: &str,
            _documents: Vec<Document>,
            _options: &WriteOptions,
        ) -> StoreResult<Vec<Value>> {
            unsupported()
        }

        async fn replace_one(
            &self,
            _collection: &str,
            filter: &Filter,
            _document: Document,
            upsert: bool,
            _options: &WriteOptions,
        ) -> StoreResult<UpdateResult> {
            assert!(!upsert);
            assert!(!filter.is_empty());
            Ok(UpdateResult {
                matched_count: 2,
                modified_count: 2,
                upserted_id: None,
            })
        }

        async fn update_one(
            &self,
            _collection: &str,
            _filter: &Filter,
            _update: &UpdateOperations,
            _options: &UpdateOptions,
        ) -> StoreResult<UpdateResult> {
            unsupported()
        }

        async fn update_many(
            &self,
            _collection: &str,
            _filter: &Filter,
            _update: &UpdateOperations,
            _options: &UpdateOptions,
        ) -> StoreResult<UpdateResult> {
            unsupported()
        }

        async fn find_one_and_update(
            &self,
            _collection: &str,
            _filter: &Filter,
            _update: &UpdateOperations,
            _return_new: bool,
        ) -> StoreResult<Option<Document>> {
            unsupported()
        }

        async fn find(
            &self,
            _collection: &str,
            _filter: &Filter,
            _limit: Option<usize>,
        ) -> StoreResult<Vec<Document>> {
            unsupported()
        }

        async fn delete_many(
            &self,
            _collection: &str,
            _filter: &Filter,
            _options: &WriteOptions,
        ) -> StoreResult<DeleteResult> {
            unsupported()
        }

        async fn count(&self, _collection: &str, _filter: &Filter) -> StoreResult<u64> {
            unsupported()
        }
    }

    fn intent(id: Option<Value>, previous: Option<i64>, new_version: i64) -> WriteIntent {
        WriteIntent {
            id,
            previous_version: previous,
            new_version,
            document: Document::new(),
        }
    }

    #[test]
    fn first_writes_are_unconditional() {
        assert_eq!(intent(None, None, 1).expected_version(), None);
        assert_eq!(intent(Some(json!("a")), None, 1).expected_version(), None);
        assert_eq!(intent(None, Some(4), 5).expected_version(), None);
        assert_eq!(intent(Some(json!("a")), Some(0), 1).expected_version(), None);
    }

    #[test]
    fn updates_expect_previous_version() {
        assert_eq!(intent(Some(json!("a")), Some(5), 6).expected_version(), Some(5));
    }

    #[tokio::test]
    async fn overcounted_conditional_replace_is_a_protocol_violation() {
        let datastore = Datastore::new(Arc::new(OvercountingStore))
            .with_registry(Arc::new(MetadataRegistry::new()));
        let ticket = Ticket {
            id: "t-1".to_string(),
            version: 5,
        };

        let intent = datastore
            .prepare_versioned(&datastore.describe::<Ticket>().unwrap(), &ticket)
            .unwrap();
        assert_eq!(intent.expected_version(), Some(5));
        assert!(!intent.document.contains_key(ID_KEY));

        let result = datastore.save(&ticket).await;
        assert!(matches!(
            result,
            Err(OdmError::ProtocolViolation(msg)) if msg.contains("modified 2")
        ));
    }
}
