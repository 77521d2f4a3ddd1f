use super::annotations::RawField;
use super::field::{FieldClassifier, FieldDescriptor};
use crate::core::{ID_KEY, OdmError, Result};
use crate::store::WriteConcern;
use regex::Regex;
use std::collections::HashMap;

lazy_static::lazy_static! {
    static ref STORAGE_KEY_PATTERN: Regex = Regex::new(r"^[^$.\x00][^.\x00]*$").unwrap();
    static ref COLLECTION_NAME_PATTERN: Regex = Regex::new(r"^[^$\x00]+$").unwrap();
}

/// Lifecycle hooks an entity type has opted into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleBindings {
    pub pre_persist: bool,
    pub post_persist: bool,
    pub post_load: bool,
}

/// Declarative mapping of an entity type, as emitted by `#[derive(Entity)]`.
#[derive(Debug, Clone)]
pub struct EntityMapping {
    pub type_name: String,
    pub collection: Option<String>,
    pub write_concern: Option<WriteConcern>,
    pub lifecycle: LifecycleBindings,
    pub fields: Vec<RawField>,
}

impl EntityMapping {
    pub fn new(type_name: impl Into<String>, fields: Vec<RawField>) -> Self {
        Self {
            type_name: type_name.into(),
            collection: None,
            write_concern: None,
            lifecycle: LifecycleBindings::default(),
            fields,
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_write_concern(mut self, concern: WriteConcern) -> Self {
        self.write_concern = Some(concern);
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: LifecycleBindings) -> Self {
        self.lifecycle = lifecycle;
        self
    }
}

/// Resolved, immutable metadata for one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDescriptor {
    type_name: String,
    collection_name: String,
    fields: Vec<FieldDescriptor>,
    identity_index: Option<usize>,
    version_index: Option<usize>,
    write_concern: Option<WriteConcern>,
    lifecycle: LifecycleBindings,
}

impl ClassDescriptor {
    /// Classifies every field and validates class-level invariants.
    pub fn from_mapping(mapping: EntityMapping) -> Result<Self> {
        let fields = mapping
            .fields
            .iter()
            .map(FieldClassifier::classify)
            .collect::<Result<Vec<_>>>()?;
        validate_declared_names(&mapping.type_name, &fields)?;

        let collection_name = mapping
            .collection
            .clone()
            .unwrap_or_else(|| mapping.type_name.clone());
        validate_collection_name(&mapping.type_name, &collection_name)?;

        let identity_index = single_index(&mapping.type_name, &fields, "identity", |f| {
            f.is_identity()
        })?;
        let version_index =
            single_index(&mapping.type_name, &fields, "version", |f| f.is_version())?;

        if let Some(field) = fields.iter().find(|f| f.is_identity() && f.is_version()) {
            return Err(OdmError::Mapping(format!(
                "{}.{} cannot be both identity and version",
                mapping.type_name,
                field.declared_name()
            )));
        }

        if let Some(index) = version_index {
            let field = &fields[index];
            if !field.is_single_value() || !field.declared_type().integral {
                return Err(OdmError::Mapping(format!(
                    "Version field {}.{} must be an integral counter, found {}",
                    mapping.type_name,
                    field.declared_name(),
                    field.declared_type().name
                )));
            }
        }

        validate_storage_keys(&mapping.type_name, &fields)?;

        Ok(Self {
            type_name: mapping.type_name,
            collection_name,
            fields,
            identity_index,
            version_index,
            write_concern: mapping.write_concern,
            lifecycle: mapping.lifecycle,
        })
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn persisted_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_persisted())
    }

    pub fn identity_field(&self) -> Option<&FieldDescriptor> {
        self.identity_index.map(|i| &self.fields[i])
    }

    pub fn version_field(&self) -> Option<&FieldDescriptor> {
        self.version_index.map(|i| &self.fields[i])
    }

    pub fn is_versioned(&self) -> bool {
        self.version_index.is_some()
    }

    pub fn write_concern(&self) -> Option<WriteConcern> {
        self.write_concern
    }

    pub fn lifecycle(&self) -> LifecycleBindings {
        self.lifecycle
    }

    pub fn field(&self, declared_name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.declared_name() == declared_name)
    }

    pub fn field_by_storage_key(&self, storage_key: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.storage_key() == storage_key)
    }

    /// Translates a caller-supplied field path into the stored key path.
    ///
    /// The first path segment may be a declared name or a storage key; nested
    /// segments are passed through untouched.
    pub fn resolve_storage_key(&self, path: &str) -> Result<String> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        let resolved = if head == ID_KEY {
            ID_KEY
        } else if let Some(field) = self.field(head) {
            field.storage_key()
        } else if let Some(field) = self.field_by_storage_key(head) {
            field.storage_key()
        } else {
            return Err(OdmError::Mapping(format!(
                "Field '{}' not found on {}",
                head, self.type_name
            )));
        };

        Ok(match rest {
            Some(rest) => format!("{resolved}.{rest}"),
            None => resolved.to_string(),
        })
    }
}

fn single_index(
    type_name: &str,
    fields: &[FieldDescriptor],
    role: &str,
    predicate: impl Fn(&FieldDescriptor) -> bool,
) -> Result<Option<usize>> {
    let matching: Vec<usize> = fields
        .iter()
        .enumerate()
        .filter(|(_, f)| predicate(f))
        .map(|(i, _)| i)
        .collect();

    if matching.len() > 1 {
        let names: Vec<&str> = matching.iter().map(|i| fields[*i].declared_name()).collect();
        return Err(OdmError::Mapping(format!(
            "{} declares more than one {} field: {:?}",
            type_name, role, names
        )));
    }
    Ok(matching.first().copied())
}

fn validate_collection_name(type_name: &str, collection: &str) -> Result<()> {
    if !COLLECTION_NAME_PATTERN.is_match(collection) || collection.starts_with("system.") {
        return Err(OdmError::Mapping(format!(
            "Invalid collection name '{}' for {}",
            collection, type_name
        )));
    }
    Ok(())
}

/// Field values travel keyed by declared name, so a flattened field may not
/// shadow one declared elsewhere on the entity.
fn validate_declared_names(type_name: &str, fields: &[FieldDescriptor]) -> Result<()> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for field in fields {
        if let Some(first) = seen.insert(field.declared_name(), field.declared_in()) {
            return Err(OdmError::Mapping(format!(
                "Field '{}' of {} is declared by both {} and {}",
                field.declared_name(),
                type_name,
                first,
                field.declared_in()
            )));
        }
    }
    Ok(())
}

fn validate_storage_keys(type_name: &str, fields: &[FieldDescriptor]) -> Result<()> {
    let mut claimed: HashMap<&str, &str> = HashMap::new();
    for field in fields.iter().filter(|f| !f.is_transient()) {
        for name in field.load_names() {
            if name != ID_KEY && !STORAGE_KEY_PATTERN.is_match(name) {
                return Err(OdmError::Mapping(format!(
                    "Invalid stored key '{}' for {}.{}",
                    name,
                    type_name,
                    field.declared_name()
                )));
            }
            if let Some(owner) = claimed.insert(name, field.declared_name()) {
                return Err(OdmError::Mapping(format!(
                    "Stored key '{}' is mapped by both {}.{} and {}.{}",
                    name,
                    type_name,
                    owner,
                    type_name,
                    field.declared_name()
                )));
            }
        }
    }
    Ok(())
}
