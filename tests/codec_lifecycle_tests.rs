/// Document codec and lifecycle tests
///
/// Run with: cargo test --test codec_lifecycle_tests

use rustodm::{
    Datastore, DatastoreConfig, DocumentStore, Entity, EntityLifecycle, Filter, Mapped,
    MemoryStore, OdmError, Result, WriteConcern, WriteOptions,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Mapped)]
struct Dimensions {
    width: u32,
    height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RenderHints {
    quality: u8,
    filters: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, PartialEq, Entity)]
#[entity(collection = "images")]
struct Image {
    #[odm(id)]
    id: Option<String>,
    #[odm(property = "file", also_load("filename", "path"))]
    file_name: String,
    caption: Option<String>,
    #[odm(embedded)]
    size: Dimensions,
    #[odm(serialized = "hints_blob")]
    hints: RenderHints,
    labels: Vec<String>,
    #[odm(transient)]
    cached_thumbnail: Option<Vec<u8>>,
}

static POST_PERSIST_CALLS: AtomicUsize = AtomicUsize::new(0);
static PERSISTED_IDS: Mutex<Vec<Option<Value>>> = Mutex::new(Vec::new());

#[derive(Debug, Clone, PartialEq, Entity)]
#[entity(collection = "audited", lifecycle(pre_persist, post_persist, post_load))]
struct Audited {
    #[odm(id)]
    id: Option<String>,
    name: String,
    #[odm(transient)]
    loaded: bool,
}

impl EntityLifecycle for Audited {
    fn pre_persist(&self, document: &mut rustodm::Document) -> Result<()> {
        document.insert("audit".to_string(), json!({"by": "system"}));
        Ok(())
    }

    fn post_persist(&self, document: &rustodm::Document) -> Result<()> {
        assert!(document.contains_key("audit"));
        POST_PERSIST_CALLS.fetch_add(1, Ordering::SeqCst);
        PERSISTED_IDS.lock().unwrap().push(document.get("_id").cloned());
        Ok(())
    }

    fn post_load(&mut self, document: &rustodm::Document) -> Result<()> {
        self.loaded = document.contains_key("audit");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Entity)]
#[entity(concern = "journaled")]
struct Unbound {
    #[odm(id)]
    id: Option<String>,
}

impl EntityLifecycle for Unbound {
    fn post_load(&mut self, _document: &rustodm::Document) -> Result<()> {
        Err(OdmError::Mapping("post_load should not be bound".to_string()))
    }
}

fn image() -> Image {
    Image {
        id: Some("img-1".to_string()),
        file_name: "cat.png".to_string(),
        caption: None,
        size: Dimensions {
            width: 640,
            height: 480,
        },
        hints: RenderHints {
            quality: 90,
            filters: BTreeMap::from([("sharpen".to_string(), true)]),
        },
        labels: vec!["cat".to_string(), "pet".to_string()],
        cached_thumbnail: Some(vec![1, 2, 3]),
    }
}

fn setup(config: DatastoreConfig) -> (Arc<MemoryStore>, Datastore) {
    let store = Arc::new(MemoryStore::new());
    let datastore = Datastore::with_config(store.clone(), config);
    (store, datastore)
}

#[test]
fn test_encode_uses_storage_keys_and_skips_transient() {
    let (_store, datastore) = setup(DatastoreConfig::default());
    let document = datastore.to_document(&image()).unwrap();

    assert_eq!(document["_id"], json!("img-1"));
    assert_eq!(document["file"], json!("cat.png"));
    assert_eq!(document["size"], json!({"width": 640, "height": 480}));
    assert_eq!(document["labels"], json!(["cat", "pet"]));
    assert!(document["hints_blob"].is_array());
    assert!(!document.contains_key("file_name"));
    assert!(!document.contains_key("caption"));
    assert!(!document.contains_key("cached_thumbnail"));
}

#[test]
fn test_round_trip_restores_everything_but_transient() {
    let (_store, datastore) = setup(DatastoreConfig::default());
    let original = image();
    let document = datastore.to_document(&original).unwrap();
    let decoded: Image = datastore.from_document(&document).unwrap();

    assert_eq!(
        decoded,
        Image {
            cached_thumbnail: None,
            ..original
        }
    );
}

#[test]
fn test_store_nulls_keeps_null_fields() {
    let (_store, datastore) = setup(DatastoreConfig::new().store_nulls(true));
    let document = datastore.to_document(&image()).unwrap();
    assert_eq!(document.get("caption"), Some(&Value::Null));

    let new_image = Image { id: None, ..image() };
    let document = datastore.to_document(&new_image).unwrap();
    assert!(!document.contains_key("_id"));
}

#[test]
fn test_aliases_load_legacy_documents() {
    let (_store, datastore) = setup(DatastoreConfig::default());
    let mut document = datastore.to_document(&image()).unwrap();
    let file = document.remove("file").unwrap();
    document.insert("path".to_string(), file);

    let decoded: Image = datastore.from_document(&document).unwrap();
    assert_eq!(decoded.file_name, "cat.png");

    document.insert("filename".to_string(), json!("dog.png"));
    let ambiguous = datastore.from_document::<Image>(&document);
    assert!(matches!(ambiguous, Err(OdmError::Mapping(_))));
}

#[tokio::test]
async fn test_lifecycle_hooks_run_when_bound_and_see_identity() {
    let (store, datastore) = setup(DatastoreConfig::default());
    let mut entity = Audited {
        id: Some("a1".to_string()),
        name: "first".to_string(),
        loaded: false,
    };

    let before = POST_PERSIST_CALLS.load(Ordering::SeqCst);
    datastore.save(&entity).await.unwrap();
    assert_eq!(POST_PERSIST_CALLS.load(Ordering::SeqCst), before + 1);

    let raw = store
        .find("audited", &Filter::by_id("a1"), None)
        .await
        .unwrap();
    assert_eq!(raw[0]["audit"], json!({"by": "system"}));

    let loaded: Audited = datastore.get("a1").await.unwrap().unwrap();
    assert!(loaded.loaded);
    assert_eq!(loaded.name, "first");
    assert_eq!(PERSISTED_IDS.lock().unwrap().last(), Some(&Some(json!("a1"))));

    entity.name = "renamed".to_string();
    datastore.merge(&entity).await.unwrap();
    assert_eq!(PERSISTED_IDS.lock().unwrap().last(), Some(&Some(json!("a1"))));

    let fresh = Audited {
        id: None,
        name: "third".to_string(),
        loaded: false,
    };
    let id = datastore.save(&fresh).await.unwrap();
    assert_eq!(
        PERSISTED_IDS.lock().unwrap().last(),
        Some(&Some(id.into_value()))
    );
}

#[tokio::test]
async fn test_unbound_hooks_are_not_called() {
    let (store, datastore) = setup(DatastoreConfig::default());
    let mut document = rustodm::Document::new();
    document.insert("_id".to_string(), json!("u1"));
    store
        .insert_one("Unbound", document, &WriteOptions::new())
        .await
        .unwrap();

    let loaded: Unbound = datastore.get("u1").await.unwrap().unwrap();
    assert_eq!(loaded.id.as_deref(), Some("u1"));
}

#[test]
fn test_config_and_write_concern_resolution() {
    let config =
        DatastoreConfig::from_json(r#"{"default_write_concern": "majority", "store_nulls": true}"#)
            .unwrap();
    assert_eq!(config.default_write_concern, WriteConcern::Majority);
    assert!(config.store_nulls);
    assert!(DatastoreConfig::from_json("[1]").is_err());

    assert_eq!("w1".parse::<WriteConcern>(), Ok(WriteConcern::Acknowledged));
    assert_eq!("Journaled".parse::<WriteConcern>(), Ok(WriteConcern::Journaled));
    assert!("w7".parse::<WriteConcern>().is_err());
    assert_eq!(DatastoreConfig::default().default_write_concern, WriteConcern::Acknowledged);

    let (_store, datastore) = setup(config);
    let unbound = datastore.describe::<Unbound>().unwrap();
    assert_eq!(unbound.write_concern(), Some(WriteConcern::Journaled));
    assert_eq!(datastore.config().default_write_concern, WriteConcern::Majority);
}
