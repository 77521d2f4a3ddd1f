use super::{
    DeleteResult, DocumentStore, Filter, StoreError, StoreResult, UpdateOperations, UpdateOptions,
    UpdateResult, WriteOptions,
};
use crate::core::{Document, ID_KEY, Identity};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// In-process document store.
///
/// All collections sit behind one lock, so every operation (including the
/// match-then-replace of `replace_one`) is atomic with respect to the others.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following call fail with [`StoreError::Unavailable`] until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn collection_names(&self) -> Vec<String> {
        let collections = self.collections.lock().await;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        names
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory store is marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

fn insert_into(
    collection_name: &str,
    documents: &mut Vec<Document>,
    mut document: Document,
) -> StoreResult<Value> {
    let id = match document.get(ID_KEY) {
        Some(id) if !id.is_null() => id.clone(),
        _ => {
            let id = Identity::generate().into_value();
            document.insert(ID_KEY.to_string(), id.clone());
            id
        }
    };

    if documents.iter().any(|existing| existing.get(ID_KEY) == Some(&id)) {
        return Err(StoreError::DuplicateKey {
            collection: collection_name.to_string(),
            key: id.to_string(),
        });
    }
    documents.push(document);
    Ok(id)
}

/// Seed document for an upsert: the filter's equality conditions on top-level keys.
fn upsert_seed(filter: &Filter) -> Document {
    let mut seed = Document::new();
    for condition in filter.conditions() {
        if let super::Condition::Eq(key, value) = condition {
            if !key.contains('.') {
                seed.insert(key.clone(), value.clone());
            }
        }
    }
    seed
}

fn update_matching(
    collection_name: &str,
    documents: &mut Vec<Document>,
    filter: &Filter,
    update: &UpdateOperations,
    options: &UpdateOptions,
    limit: Option<usize>,
) -> StoreResult<UpdateResult> {
    let mut result = UpdateResult::default();
    for document in documents.iter_mut().filter(|d| filter.matches(d)) {
        if limit.is_some_and(|limit| result.matched_count as usize >= limit) {
            break;
        }
        result.matched_count += 1;
        let mut updated = document.clone();
        update.apply(&mut updated)?;
        if updated != *document {
            *document = updated;
            result.modified_count += 1;
        }
    }

    if result.matched_count == 0 && options.upsert {
        let mut seed = upsert_seed(filter);
        update.apply(&mut seed)?;
        result.upserted_id = Some(insert_into(collection_name, documents, seed)?);
    }
    Ok(result)
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        _options: &WriteOptions,
    ) -> StoreResult<Value> {
        self.check_available()?;
        let mut collections = self.collections.lock().await;
        let documents = collections.entry(collection.to_string()).or_default();
        insert_into(collection, documents, document)
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        _options: &WriteOptions,
    ) -> StoreResult<Vec<Value>> {
        self.check_available()?;
        let mut collections = self.collections.lock().await;
        let stored = collections.entry(collection.to_string()).or_default();
        documents
            .into_iter()
            .map(|document| insert_into(collection, stored, document))
            .collect()
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        mut replacement: Document,
        upsert: bool,
        _options: &WriteOptions,
    ) -> StoreResult<UpdateResult> {
        self.check_available()?;
        let mut collections = self.collections.lock().await;
        let documents = collections.entry(collection.to_string()).or_default();

        if let Some(existing) = documents.iter_mut().find(|d| filter.matches(d)) {
            if let Some(id) = existing.get(ID_KEY).cloned() {
                replacement.insert(ID_KEY.to_string(), id);
            }
            let modified = *existing != replacement;
            *existing = replacement;
            return Ok(UpdateResult {
                matched_count: 1,
                modified_count: u64::from(modified),
                upserted_id: None,
            });
        }

        if !upsert {
            return Ok(UpdateResult::default());
        }

        if !replacement.contains_key(ID_KEY) {
            if let Some(id) = filter.equality_value(ID_KEY) {
                replacement.insert(ID_KEY.to_string(), id.clone());
            }
        }
        let id = insert_into(collection, documents, replacement)?;
        Ok(UpdateResult {
            matched_count: 0,
            modified_count: 0,
            upserted_id: Some(id),
        })
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateOperations,
        options: &UpdateOptions,
    ) -> StoreResult<UpdateResult> {
        self.check_available()?;
        let mut collections = self.collections.lock().await;
        let documents = collections.entry(collection.to_string()).or_default();
        update_matching(collection, documents, filter, update, options, Some(1))
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateOperations,
        options: &UpdateOptions,
    ) -> StoreResult<UpdateResult> {
        self.check_available()?;
        let mut collections = self.collections.lock().await;
        let documents = collections.entry(collection.to_string()).or_default();
        update_matching(collection, documents, filter, update, options, None)
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateOperations,
        return_new: bool,
    ) -> StoreResult<Option<Document>> {
        self.check_available()?;
        let mut collections = self.collections.lock().await;
        let documents = collections.entry(collection.to_string()).or_default();
        let Some(document) = documents.iter_mut().find(|d| filter.matches(d)) else {
            return Ok(None);
        };

        let mut updated = document.clone();
        update.apply(&mut updated)?;
        let before = std::mem::replace(document, updated);
        Ok(Some(if return_new { document.clone() } else { before }))
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Document>> {
        self.check_available()?;
        let collections = self.collections.lock().await;
        let Some(documents) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(documents
            .iter()
            .filter(|d| filter.matches(d))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn delete_many(
        &self,
        collection: &str,
        filter: &Filter,
        _options: &WriteOptions,
    ) -> StoreResult<DeleteResult> {
        self.check_available()?;
        let mut collections = self.collections.lock().await;
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(DeleteResult::default());
        };
        let before = documents.len();
        documents.retain(|d| !filter.matches(d));
        Ok(DeleteResult {
            deleted_count: (before - documents.len()) as u64,
        })
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.check_available()?;
        let collections = self.collections.lock().await;
        Ok(collections
            .get(collection)
            .map(|documents| documents.iter().filter(|d| filter.matches(d)).count() as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_generates_identity_and_rejects_duplicates() {
        let store = MemoryStore::new();
        let opts = WriteOptions::default();
        let id = store.insert_one("c", doc(json!({"a": 1})), &opts).await.unwrap();
        assert!(id.is_string());

        store.insert_one("c", doc(json!({"_id": "x"})), &opts).await.unwrap();
        let err = store
            .insert_one("c", doc(json!({"_id": "x"})), &opts)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
        assert_eq!(store.count("c", &Filter::new()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn replace_reports_zero_modified_for_identical_document() {
        let store = MemoryStore::new();
        let opts = WriteOptions::default();
        store
            .insert_one("c", doc(json!({"_id": "x", "v": 1})), &opts)
            .await
            .unwrap();

        let same = store
            .replace_one("c", &Filter::by_id("x"), doc(json!({"v": 1})), false, &opts)
            .await
            .unwrap();
        assert_eq!((same.matched_count, same.modified_count), (1, 0));

        let changed = store
            .replace_one("c", &Filter::by_id("x"), doc(json!({"v": 2})), false, &opts)
            .await
            .unwrap();
        assert_eq!((changed.matched_count, changed.modified_count), (1, 1));

        let stored = store.find("c", &Filter::by_id("x"), None).await.unwrap();
        assert_eq!(Value::Object(stored[0].clone()), json!({"_id": "x", "v": 2}));
    }

    #[tokio::test]
    async fn replace_upsert_takes_identity_from_filter() {
        let store = MemoryStore::new();
        let result = store
            .replace_one(
                "c",
                &Filter::by_id("y"),
                doc(json!({"v": 1})),
                true,
                &WriteOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(result.upserted_id, Some(json!("y")));
        assert_eq!(store.count("c", &Filter::by_id("y")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let err = store.count("c", &Filter::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        store.set_unavailable(false);
        assert_eq!(store.count("c", &Filter::new()).await.unwrap(), 0);
    }
}
