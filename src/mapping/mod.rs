//! Entity metadata: field classification, class descriptors and the
//! process-wide descriptor cache.

pub mod annotations;
pub mod class;
pub mod entity;
pub mod field;
pub mod registry;
pub mod type_info;

pub use annotations::{Annotation, AnnotationKind, RawField};
pub use class::{ClassDescriptor, EntityMapping, LifecycleBindings};
pub use entity::{Entity, EntityLifecycle, Mapped};
pub use field::{FieldClassifier, FieldDescriptor, ValueArity};
pub use registry::{MappingWarning, MetadataRegistry, ValidationHook};
pub use type_info::{ContainerFlags, MappedType, TypeInfo};
