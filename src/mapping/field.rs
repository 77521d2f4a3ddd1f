use super::annotations::{Annotation, AnnotationKind, RawField};
use super::type_info::TypeInfo;
use crate::core::{Document, ID_KEY, OdmError, Result, USE_FIELD_NAME};
use std::fmt;

/// How many values a field holds, and in what kind of container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueArity {
    Single,
    Array,
    List,
    Set,
    Map,
}

impl ValueArity {
    pub fn is_multi_valued(self) -> bool {
        !matches!(self, Self::Single)
    }
}

impl fmt::Display for ValueArity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Single => "single",
            Self::Array => "array",
            Self::List => "list",
            Self::Set => "set",
            Self::Map => "map",
        };
        write!(f, "{label}")
    }
}

/// Resolved mapping of one entity field to its stored document key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    declared_name: String,
    declared_in: String,
    declared_type: TypeInfo,
    element_type: Option<TypeInfo>,
    map_key_type: Option<TypeInfo>,
    storage_key: String,
    alternate_load_keys: Vec<String>,
    arity: ValueArity,
    natively_representable: bool,
    permissive_element_fallback: bool,
    annotations: Vec<Annotation>,
}

impl FieldDescriptor {
    pub fn declared_name(&self) -> &str {
        &self.declared_name
    }

    /// Type that declared the field (differs from the entity for flattened fields).
    pub fn declared_in(&self) -> &str {
        &self.declared_in
    }

    pub fn declared_type(&self) -> &TypeInfo {
        &self.declared_type
    }

    pub fn element_type(&self) -> Option<&TypeInfo> {
        self.element_type.as_ref()
    }

    pub fn map_key_type(&self) -> Option<&TypeInfo> {
        self.map_key_type.as_ref()
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub fn alternate_load_keys(&self) -> &[String] {
        &self.alternate_load_keys
    }

    /// Storage key followed by every alias, in declaration order.
    pub fn load_names(&self) -> Vec<&str> {
        std::iter::once(self.storage_key.as_str())
            .chain(self.alternate_load_keys.iter().map(String::as_str))
            .collect()
    }

    pub fn arity(&self) -> ValueArity {
        self.arity
    }

    pub fn is_single_value(&self) -> bool {
        self.arity == ValueArity::Single
    }

    pub fn is_array(&self) -> bool {
        self.arity == ValueArity::Array
    }

    pub fn is_list(&self) -> bool {
        self.arity == ValueArity::List
    }

    pub fn is_set(&self) -> bool {
        self.arity == ValueArity::Set
    }

    pub fn is_map(&self) -> bool {
        self.arity == ValueArity::Map
    }

    pub fn is_natively_representable(&self) -> bool {
        self.natively_representable
    }

    /// Native representability was assumed because the element type is erased.
    pub fn used_permissive_fallback(&self) -> bool {
        self.permissive_element_fallback
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn has_annotation(&self, kind: AnnotationKind) -> bool {
        self.annotations.iter().any(|a| a.kind() == Some(kind))
    }

    pub fn is_identity(&self) -> bool {
        self.has_annotation(AnnotationKind::Id)
    }

    pub fn is_version(&self) -> bool {
        self.has_annotation(AnnotationKind::Version)
    }

    pub fn is_reference(&self) -> bool {
        self.has_annotation(AnnotationKind::Reference) || self.declared_type.reference_key
    }

    pub fn is_embedded(&self) -> bool {
        self.has_annotation(AnnotationKind::Embedded)
    }

    pub fn is_serialized(&self) -> bool {
        self.has_annotation(AnnotationKind::Serialized)
    }

    pub fn is_transient(&self) -> bool {
        self.has_annotation(AnnotationKind::Transient)
    }

    /// Loaded from stored documents but never written back.
    pub fn is_not_saved(&self) -> bool {
        self.has_annotation(AnnotationKind::NotSaved)
    }

    pub fn is_persisted(&self) -> bool {
        !self.is_transient() && !self.is_not_saved()
    }

    /// Picks the one load name present in `document`.
    ///
    /// Fails when the storage key and an alias (or two aliases) are both present.
    pub fn resolve_load_key<'a>(&'a self, document: &Document) -> Result<Option<&'a str>> {
        let mut found: Option<&str> = None;
        for name in self.load_names() {
            if !document.contains_key(name) {
                continue;
            }
            if let Some(previous) = found {
                return Err(OdmError::Mapping(format!(
                    "Found more than one stored key for field '{}' ('{}' and '{}'); load names: {:?}",
                    self.declared_name,
                    previous,
                    name,
                    self.load_names()
                )));
            }
            found = Some(name);
        }
        Ok(found)
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (type: {}, {}",
            self.storage_key, self.declared_type.name, self.arity
        )?;
        if let Some(element) = &self.element_type {
            write!(f, ", subtype: {}", element.name)?;
        }
        if let Some(key) = &self.map_key_type {
            write!(f, ", map-key: {}", key.name)?;
        }
        write!(f, ")")
    }
}

/// Turns a raw field declaration into a [`FieldDescriptor`].
///
/// Pure: the result depends only on the declared type facts and annotations.
pub struct FieldClassifier;

impl FieldClassifier {
    pub fn classify(raw: &RawField) -> Result<FieldDescriptor> {
        let annotations: Vec<Annotation> = raw
            .annotations
            .iter()
            .filter(|a| a.kind().is_some())
            .cloned()
            .collect();

        let arity = Self::arity_of(raw)?;
        let declared = &raw.type_info;

        let (element_type, map_key_type) = if arity.is_multi_valued() {
            let element = declared
                .element
                .as_deref()
                .filter(|element| !element.dynamic)
                .cloned();
            let key = if arity == ValueArity::Map {
                declared.map_key.as_deref().cloned()
            } else {
                None
            };
            (element, key)
        } else {
            (None, None)
        };

        let mut natively_representable = declared.store_primitive;
        if !natively_representable {
            if let Some(element) = &element_type {
                natively_representable = element.store_primitive;
            }
        }
        let mut permissive_element_fallback = false;
        if !natively_representable && arity.is_multi_valued() && element_type.is_none() {
            natively_representable = true;
            permissive_element_fallback = true;
        }

        let storage_key = Self::storage_key_of(&raw.name, &annotations);
        let alternate_load_keys = annotations
            .iter()
            .find_map(|a| match a {
                Annotation::AlsoLoad(names) => Some(names.clone()),
                _ => None,
            })
            .unwrap_or_default();

        Ok(FieldDescriptor {
            declared_name: raw.name.clone(),
            declared_in: raw.declared_in.clone(),
            declared_type: declared.clone(),
            element_type,
            map_key_type,
            storage_key,
            alternate_load_keys,
            arity,
            natively_representable,
            permissive_element_fallback,
            annotations,
        })
    }

    /// Array, map, set, list in that priority; more than one is a contradiction.
    fn arity_of(raw: &RawField) -> Result<ValueArity> {
        let flags = raw.type_info.container;
        if flags.count() > 1 {
            return Err(OdmError::classification(
                format!("{}.{}", raw.declared_in, raw.name),
                format!(
                    "type {} reports more than one container shape (array={}, map={}, set={}, list={})",
                    raw.type_info.name, flags.array, flags.map, flags.set, flags.list
                ),
            ));
        }

        let arity = if flags.array {
            ValueArity::Array
        } else if flags.map {
            ValueArity::Map
        } else if flags.set {
            ValueArity::Set
        } else if flags.list {
            ValueArity::List
        } else {
            ValueArity::Single
        };
        Ok(arity)
    }

    /// Identity key first, then the first explicit-name annotation, then the declared name.
    fn storage_key_of(declared_name: &str, annotations: &[Annotation]) -> String {
        if annotations.iter().any(|a| matches!(a, Annotation::Id)) {
            return ID_KEY.to_string();
        }

        let precedence = [
            AnnotationKind::Property,
            AnnotationKind::Reference,
            AnnotationKind::Embedded,
            AnnotationKind::Serialized,
            AnnotationKind::Version,
        ];
        for kind in precedence {
            let Some(annotation) = annotations.iter().find(|a| a.kind() == Some(kind)) else {
                continue;
            };
            return match annotation.explicit_name() {
                Some(name) if name != USE_FIELD_NAME && !name.is_empty() => name.to_string(),
                _ => declared_name.to_string(),
            };
        }

        declared_name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::type_info::{ContainerFlags, MappedType};
    use std::collections::{HashMap, HashSet};

    fn raw<T: MappedType>(name: &str) -> RawField {
        RawField::new(name, "Sample", T::type_info())
    }

    #[test]
    fn plain_field_keeps_declared_name() {
        let field = FieldClassifier::classify(&raw::<String>("title")).unwrap();
        assert_eq!(field.storage_key(), "title");
        assert!(field.is_single_value());
        assert!(field.is_natively_representable());
        assert!(field.alternate_load_keys().is_empty());
    }

    #[test]
    fn identity_wins_over_explicit_name() {
        let field = FieldClassifier::classify(
            &raw::<String>("key")
                .with_annotation(Annotation::property("custom"))
                .with_annotation(Annotation::Id),
        )
        .unwrap();
        assert_eq!(field.storage_key(), ID_KEY);
        assert!(field.is_identity());
    }

    #[test]
    fn explicit_name_and_sentinel() {
        let named = FieldClassifier::classify(
            &raw::<i64>("count").with_annotation(Annotation::property("n")),
        )
        .unwrap();
        assert_eq!(named.storage_key(), "n");

        let sentinel = FieldClassifier::classify(
            &raw::<i64>("count").with_annotation(Annotation::property(USE_FIELD_NAME)),
        )
        .unwrap();
        assert_eq!(sentinel.storage_key(), "count");

        let version = FieldClassifier::classify(
            &raw::<Option<i64>>("version").with_annotation(Annotation::Version("v".to_string())),
        )
        .unwrap();
        assert_eq!(version.storage_key(), "v");
        assert!(version.is_version());
    }

    #[test]
    fn first_present_name_annotation_decides() {
        // A defaulted property stops the search even when a later annotation names a key.
        let field = FieldClassifier::classify(
            &raw::<String>("owner")
                .with_annotation(Annotation::Reference("owner_ref".to_string()))
                .with_annotation(Annotation::property(USE_FIELD_NAME)),
        )
        .unwrap();
        assert_eq!(field.storage_key(), "owner");
        assert!(field.is_reference());
    }

    #[test]
    fn containers_get_exactly_one_arity() {
        let list = FieldClassifier::classify(&raw::<Vec<i64>>("xs")).unwrap();
        let set = FieldClassifier::classify(&raw::<HashSet<String>>("tags")).unwrap();
        let map = FieldClassifier::classify(&raw::<HashMap<String, f64>>("scores")).unwrap();
        let array = FieldClassifier::classify(&raw::<[u8; 16]>("digest")).unwrap();

        assert_eq!(list.arity(), ValueArity::List);
        assert_eq!(set.arity(), ValueArity::Set);
        assert_eq!(map.arity(), ValueArity::Map);
        assert_eq!(array.arity(), ValueArity::Array);
        for field in [&list, &set, &map, &array] {
            let flags = [field.is_array(), field.is_map(), field.is_set(), field.is_list()];
            assert_eq!(flags.iter().filter(|f| **f).count(), 1);
            assert!(!field.is_single_value());
        }
        assert_eq!(map.map_key_type().map(|k| k.name.as_str()), Some("String"));
        assert_eq!(map.element_type().map(|e| e.name.as_str()), Some("f64"));
    }

    #[test]
    fn contradictory_shape_is_rejected() {
        let mut info = Vec::<i64>::type_info();
        info.container = ContainerFlags {
            array: true,
            map: true,
            ..ContainerFlags::default()
        };
        let err = FieldClassifier::classify(&RawField::new("weird", "Sample", info)).unwrap_err();
        assert!(matches!(err, OdmError::Classification { ref field, .. } if field == "Sample.weird"));
    }

    #[test]
    fn erased_element_type_is_permissively_native() {
        let dynamic = FieldClassifier::classify(&raw::<Vec<serde_json::Value>>("payload")).unwrap();
        assert!(dynamic.element_type().is_none());
        assert!(dynamic.is_natively_representable());
        assert!(dynamic.used_permissive_fallback());

        let erased = FieldClassifier::classify(&RawField::new(
            "bag",
            "Sample",
            TypeInfo::list("Bag", TypeInfo::embedded("Item")).erased(),
        ))
        .unwrap();
        assert!(erased.is_natively_representable());
        assert!(erased.used_permissive_fallback());
    }

    #[test]
    fn embedded_elements_are_not_native() {
        let field = FieldClassifier::classify(&RawField::new(
            "lines",
            "Sample",
            TypeInfo::list("Vec", TypeInfo::embedded("Line")),
        ))
        .unwrap();
        assert!(!field.is_natively_representable());
        assert!(!field.used_permissive_fallback());
    }

    #[test]
    fn unrecognized_annotations_are_ignored() {
        let field = FieldClassifier::classify(
            &raw::<String>("name")
                .with_annotation(Annotation::Other("indexed".to_string()))
                .with_annotation(Annotation::also_load(["full_name", "fullName"])),
        )
        .unwrap();
        assert_eq!(field.annotations().len(), 1);
        assert_eq!(field.load_names(), vec!["name", "full_name", "fullName"]);
    }

    #[test]
    fn more_than_one_load_name_present_is_an_error() {
        let field = FieldClassifier::classify(
            &raw::<String>("name").with_annotation(Annotation::also_load(["full_name"])),
        )
        .unwrap();

        let mut doc = Document::new();
        doc.insert("full_name".to_string(), "Ada".into());
        assert_eq!(field.resolve_load_key(&doc).unwrap(), Some("full_name"));

        doc.insert("name".to_string(), "Ada".into());
        assert!(matches!(field.resolve_load_key(&doc), Err(OdmError::Mapping(_))));
    }
}
