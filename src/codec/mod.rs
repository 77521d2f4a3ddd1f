//! Entity <-> document conversion driven by class metadata.
//!
//! Primitive value encoding is serde's job; this layer decides which keys a
//! value lands under and which fields take part at all.

use crate::core::{Document, OdmError, Result};
use crate::mapping::{ClassDescriptor, Entity};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentCodec {
    store_nulls: bool,
}

impl DocumentCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `null` values of ordinary fields instead of omitting the key.
    pub fn store_nulls(mut self, store_nulls: bool) -> Self {
        self.store_nulls = store_nulls;
        self
    }

    /// Encodes `entity` under its storage keys.
    ///
    /// Transient and not-saved fields are skipped. A null identity or
    /// version is always omitted.
    pub fn encode<T: Entity>(&self, entity: &T, descriptor: &ClassDescriptor) -> Result<Document> {
        let mut values = Document::new();
        entity.write_fields(&mut values)?;

        let mut document = Document::new();
        for field in descriptor.persisted_fields() {
            let Some(value) = values.remove(field.declared_name()) else {
                continue;
            };
            if value.is_null() && (field.is_identity() || field.is_version() || !self.store_nulls)
            {
                continue;
            }
            document.insert(field.storage_key().to_string(), value);
        }
        Ok(document)
    }

    /// Decodes a stored document, honoring load aliases.
    pub fn decode<T: Entity>(&self, document: &Document, descriptor: &ClassDescriptor) -> Result<T> {
        let mut values = Document::new();
        for field in descriptor.fields().iter().filter(|f| !f.is_transient()) {
            if let Some(key) = field.resolve_load_key(document)? {
                if let Some(value) = document.get(key) {
                    values.insert(field.declared_name().to_string(), value.clone());
                }
            }
        }

        let mut entity = T::read_fields(&mut values)?;
        if descriptor.lifecycle().post_load {
            entity.post_load(document)?;
        }
        Ok(entity)
    }
}

pub fn to_value<T: Serialize>(field: &str, value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|err| OdmError::Codec(format!("encode field '{field}': {err}")))
}

/// Removes `field` from `values` and deserializes it; a missing key reads as `null`.
pub fn take_value<T: DeserializeOwned>(values: &mut Document, field: &str) -> Result<T> {
    let value = values.remove(field).unwrap_or(Value::Null);
    serde_json::from_value(value)
        .map_err(|err| OdmError::Codec(format!("decode field '{field}': {err}")))
}

/// Encodes a value as an opaque MessagePack blob.
pub fn to_blob<T: Serialize>(field: &str, value: &T) -> Result<Value> {
    let bytes = rmp_serde::to_vec_named(value)
        .map_err(|err| OdmError::Codec(format!("serialize field '{field}': {err}")))?;
    Ok(Value::Array(bytes.into_iter().map(Value::from).collect()))
}

pub fn take_blob<T: DeserializeOwned>(values: &mut Document, field: &str) -> Result<T> {
    let value = values.remove(field).unwrap_or(Value::Null);
    if value.is_null() {
        return serde_json::from_value(Value::Null)
            .map_err(|err| OdmError::Codec(format!("decode field '{field}': {err}")));
    }

    let bytes: Vec<u8> = serde_json::from_value(value)
        .map_err(|err| OdmError::Codec(format!("field '{field}' is not a blob: {err}")))?;
    rmp_serde::from_slice(&bytes)
        .map_err(|err| OdmError::Codec(format!("deserialize field '{field}': {err}")))
}

/// Reads an integral version value; `null` means "not yet versioned".
pub fn version_of(type_name: &str, value: Option<Value>) -> Result<Option<i64>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_i64().map(Some).ok_or_else(|| {
            OdmError::Mapping(format!("Version of {type_name} is not an integral counter: {n}"))
        }),
        Some(other) => Err(OdmError::Mapping(format!(
            "Version of {type_name} is not an integral counter: {other}"
        ))),
    }
}
