use super::class::ClassDescriptor;
use super::entity::Entity;
use super::field::FieldDescriptor;
use crate::core::Result;
use log::{debug, warn};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

type Slot = Arc<OnceLock<Result<Arc<ClassDescriptor>>>>;

/// Notified for mapping decisions that succeeded but may deserve attention.
pub type ValidationHook = Arc<dyn Fn(&MappingWarning) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingWarning {
    /// A container field with an erased element type was assumed to be natively storable.
    PermissiveElementType { type_name: String, field: String },
}

impl fmt::Display for MappingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissiveElementType { type_name, field } => write!(
                f,
                "{type_name}.{field}: element type unknown, assuming the store can persist it"
            ),
        }
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<MetadataRegistry> = Arc::new(MetadataRegistry::new());
}

/// Process-wide cache of entity type to [`ClassDescriptor`].
///
/// Each type owns a slot that is filled exactly once; concurrent first
/// callers for the same type wait on that slot, callers for other types
/// never do. Entries are never evicted, and failed builds stay cached.
pub struct MetadataRegistry {
    slots: RwLock<HashMap<TypeId, Slot>>,
    hook: Option<ValidationHook>,
}

impl Default for MetadataRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            hook: None,
        }
    }

    pub fn with_validation_hook(mut self, hook: ValidationHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn global() -> Arc<MetadataRegistry> {
        GLOBAL_REGISTRY.clone()
    }

    pub fn describe<T: Entity>(&self) -> Result<Arc<ClassDescriptor>> {
        let slot = self.slot_for(TypeId::of::<T>())?;
        slot.get_or_init(|| self.build::<T>()).clone()
    }

    pub fn is_described<T: Entity>(&self) -> bool {
        self.slots
            .read()
            .map(|slots| {
                slots
                    .get(&TypeId::of::<T>())
                    .is_some_and(|slot| matches!(slot.get(), Some(Ok(_))))
            })
            .unwrap_or(false)
    }

    /// Number of successfully described types; cached failures are not counted.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .map(|slots| {
                slots
                    .values()
                    .filter(|slot| matches!(slot.get(), Some(Ok(_))))
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Type names of every successfully described entity, sorted.
    pub fn described_types(&self) -> Result<Vec<String>> {
        let slots = self.slots.read()?;
        let mut names: Vec<String> = slots
            .values()
            .filter_map(|slot| match slot.get() {
                Some(Ok(descriptor)) => Some(descriptor.type_name().to_string()),
                _ => None,
            })
            .collect();
        names.sort();
        Ok(names)
    }

    fn slot_for(&self, type_id: TypeId) -> Result<Slot> {
        if let Some(slot) = self.slots.read()?.get(&type_id) {
            return Ok(slot.clone());
        }
        let mut slots = self.slots.write()?;
        Ok(slots.entry(type_id).or_default().clone())
    }

    fn build<T: Entity>(&self) -> Result<Arc<ClassDescriptor>> {
        let mapping = T::entity_mapping();
        let type_name = mapping.type_name.clone();
        let descriptor = ClassDescriptor::from_mapping(mapping)?;

        for field in descriptor
            .fields()
            .iter()
            .filter(|f| f.used_permissive_fallback())
        {
            self.report_permissive(&type_name, field);
        }

        debug!(
            "described entity '{}' -> collection '{}' ({} fields, versioned={})",
            type_name,
            descriptor.collection_name(),
            descriptor.fields().len(),
            descriptor.is_versioned()
        );
        Ok(Arc::new(descriptor))
    }

    fn report_permissive(&self, type_name: &str, field: &FieldDescriptor) {
        let warning = MappingWarning::PermissiveElementType {
            type_name: type_name.to_string(),
            field: field.declared_name().to_string(),
        };
        warn!("{}", warning);
        if let Some(hook) = &self.hook {
            hook(&warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Document, OdmError};
    use crate::mapping::annotations::{Annotation, RawField};
    use crate::mapping::class::EntityMapping;
    use crate::mapping::entity::Mapped;
    use crate::mapping::type_info::MappedType;
    use serde_json::Value;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static BUILDS: AtomicUsize = AtomicUsize::new(0);

    struct Sensor;

    impl Mapped for Sensor {
        fn raw_fields() -> Vec<RawField> {
            BUILDS.fetch_add(1, Ordering::SeqCst);
            vec![
                RawField::new("id", "Sensor", String::type_info()).with_annotation(Annotation::Id),
                RawField::new("blobs", "Sensor", Vec::<Value>::type_info()),
            ]
        }

        fn write_fields(&self, _out: &mut Document) -> Result<()> {
            Ok(())
        }

        fn read_fields(_values: &mut Document) -> Result<Self> {
            Ok(Sensor)
        }

        fn field_value(&self, _declared_name: &str) -> Result<Option<Value>> {
            Ok(None)
        }
    }

    impl Entity for Sensor {
        fn entity_mapping() -> EntityMapping {
            EntityMapping::new("Sensor", Self::raw_fields())
        }
    }

    struct Broken;

    impl Mapped for Broken {
        fn raw_fields() -> Vec<RawField> {
            vec![
                RawField::new("a", "Broken", String::type_info()).with_annotation(Annotation::Id),
                RawField::new("b", "Broken", String::type_info()).with_annotation(Annotation::Id),
            ]
        }

        fn write_fields(&self, _out: &mut Document) -> Result<()> {
            Ok(())
        }

        fn read_fields(_values: &mut Document) -> Result<Self> {
            Ok(Broken)
        }

        fn field_value(&self, _declared_name: &str) -> Result<Option<Value>> {
            Ok(None)
        }
    }

    impl Entity for Broken {
        fn entity_mapping() -> EntityMapping {
            EntityMapping::new("Broken", Self::raw_fields())
        }
    }

    #[test]
    fn concurrent_first_access_converges_on_one_descriptor() {
        let warnings = Arc::new(Mutex::new(Vec::new()));
        let sink = warnings.clone();
        let registry = Arc::new(MetadataRegistry::new().with_validation_hook(Arc::new(
            move |warning: &MappingWarning| sink.lock().unwrap().push(warning.clone()),
        )));
        let before = BUILDS.load(Ordering::SeqCst);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.describe::<Sensor>().unwrap())
            })
            .collect();
        let descriptors: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for descriptor in &descriptors {
            assert!(Arc::ptr_eq(descriptor, &descriptors[0]));
        }
        assert_eq!(BUILDS.load(Ordering::SeqCst) - before, 1);
        assert_eq!(warnings.lock().unwrap().len(), 1);
        assert!(registry.is_described::<Sensor>());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.described_types().unwrap(), vec!["Sensor".to_string()]);
    }

    #[test]
    fn failures_are_cached_and_returned_to_every_caller() {
        let registry = MetadataRegistry::new();
        let first = registry.describe::<Broken>().unwrap_err();
        let second = registry.describe::<Broken>().unwrap_err();
        assert!(matches!(first, OdmError::Mapping(_)));
        assert_eq!(first, second);
        assert!(registry.described_types().unwrap().is_empty());
        assert!(!registry.is_described::<Broken>());
        assert_eq!(registry.len(), 0);
        assert!(registry.is_empty());
    }
}
