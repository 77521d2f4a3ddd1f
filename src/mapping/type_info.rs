use crate::core::{EntityKey, Identity};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// Container predicates reported by a type.
///
/// Built-in types set at most one flag. Hand-written `MappedType` impls may
/// report any combination; the classifier rejects contradictory ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerFlags {
    pub array: bool,
    pub map: bool,
    pub set: bool,
    pub list: bool,
}

impl ContainerFlags {
    pub fn count(&self) -> usize {
        [self.array, self.map, self.set, self.list]
            .iter()
            .filter(|flag| **flag)
            .count()
    }

    pub fn any(&self) -> bool {
        self.count() > 0
    }
}

/// Compile-time facts about a field type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub name: String,
    pub container: ContainerFlags,
    pub element: Option<Box<TypeInfo>>,
    pub map_key: Option<Box<TypeInfo>>,
    /// The store driver persists this type without decomposition.
    pub store_primitive: bool,
    pub integral: bool,
    /// Erased type: the element type of a container is not statically known.
    pub dynamic: bool,
    pub reference_key: bool,
}

impl TypeInfo {
    fn base(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            container: ContainerFlags::default(),
            element: None,
            map_key: None,
            store_primitive: false,
            integral: false,
            dynamic: false,
            reference_key: false,
        }
    }

    pub fn primitive(name: impl Into<String>) -> Self {
        Self {
            store_primitive: true,
            ..Self::base(name)
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self {
            integral: true,
            ..Self::primitive(name)
        }
    }

    /// Structured type that needs its own mapping (embedded documents).
    pub fn embedded(name: impl Into<String>) -> Self {
        Self::base(name)
    }

    pub fn dynamic(name: impl Into<String>) -> Self {
        Self {
            dynamic: true,
            ..Self::base(name)
        }
    }

    pub fn reference_key(name: impl Into<String>) -> Self {
        Self {
            reference_key: true,
            ..Self::primitive(name)
        }
    }

    pub fn array(element: TypeInfo) -> Self {
        Self {
            container: ContainerFlags {
                array: true,
                ..ContainerFlags::default()
            },
            element: Some(Box::new(element.clone())),
            ..Self::base(format!("[{}]", element.name))
        }
    }

    pub fn list(name: &str, element: TypeInfo) -> Self {
        Self {
            container: ContainerFlags {
                list: true,
                ..ContainerFlags::default()
            },
            element: Some(Box::new(element.clone())),
            ..Self::base(format!("{name}<{}>", element.name))
        }
    }

    pub fn set(name: &str, element: TypeInfo) -> Self {
        Self {
            container: ContainerFlags {
                set: true,
                ..ContainerFlags::default()
            },
            element: Some(Box::new(element.clone())),
            ..Self::base(format!("{name}<{}>", element.name))
        }
    }

    pub fn map(name: &str, key: TypeInfo, value: TypeInfo) -> Self {
        Self {
            container: ContainerFlags {
                map: true,
                ..ContainerFlags::default()
            },
            element: Some(Box::new(value.clone())),
            map_key: Some(Box::new(key.clone())),
            ..Self::base(format!("{name}<{}, {}>", key.name, value.name))
        }
    }

    /// Container whose element type is erased.
    pub fn erased(self) -> Self {
        Self {
            element: None,
            ..self
        }
    }

    pub fn is_multi_valued(&self) -> bool {
        self.container.any()
    }
}

/// Implemented by every type that can appear as a mapped field.
pub trait MappedType {
    fn type_info() -> TypeInfo;
}

macro_rules! mapped_integers {
    ($($ty:ty),*) => {
        $(
            impl MappedType for $ty {
                fn type_info() -> TypeInfo {
                    TypeInfo::integer(stringify!($ty))
                }
            }
        )*
    };
}

macro_rules! mapped_primitives {
    ($($ty:ty),*) => {
        $(
            impl MappedType for $ty {
                fn type_info() -> TypeInfo {
                    TypeInfo::primitive(stringify!($ty))
                }
            }
        )*
    };
}

mapped_integers!(i8, i16, i32, i64, u8, u16, u32, u64, isize, usize);
mapped_primitives!(f32, f64, bool, char, String, Uuid, NaiveDate, NaiveDateTime);

impl MappedType for DateTime<Utc> {
    fn type_info() -> TypeInfo {
        TypeInfo::primitive("DateTime<Utc>")
    }
}

impl MappedType for Identity {
    fn type_info() -> TypeInfo {
        TypeInfo::primitive("Identity")
    }
}

impl MappedType for EntityKey {
    fn type_info() -> TypeInfo {
        TypeInfo::reference_key("EntityKey")
    }
}

impl MappedType for serde_json::Value {
    fn type_info() -> TypeInfo {
        TypeInfo::dynamic("Value")
    }
}

impl MappedType for serde_json::Map<String, serde_json::Value> {
    fn type_info() -> TypeInfo {
        TypeInfo::map("Map", String::type_info(), serde_json::Value::type_info())
    }
}

impl<T: MappedType> MappedType for Option<T> {
    fn type_info() -> TypeInfo {
        T::type_info()
    }
}

impl<T: MappedType> MappedType for Box<T> {
    fn type_info() -> TypeInfo {
        T::type_info()
    }
}

impl<T: MappedType> MappedType for Vec<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::list("Vec", T::type_info())
    }
}

impl<T: MappedType> MappedType for VecDeque<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::list("VecDeque", T::type_info())
    }
}

impl<T: MappedType, const N: usize> MappedType for [T; N] {
    fn type_info() -> TypeInfo {
        TypeInfo::array(T::type_info())
    }
}

impl<T: MappedType, S> MappedType for HashSet<T, S> {
    fn type_info() -> TypeInfo {
        TypeInfo::set("HashSet", T::type_info())
    }
}

impl<T: MappedType> MappedType for BTreeSet<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::set("BTreeSet", T::type_info())
    }
}

impl<K: MappedType, V: MappedType, S> MappedType for HashMap<K, V, S> {
    fn type_info() -> TypeInfo {
        TypeInfo::map("HashMap", K::type_info(), V::type_info())
    }
}

impl<K: MappedType, V: MappedType> MappedType for BTreeMap<K, V> {
    fn type_info() -> TypeInfo {
        TypeInfo::map("BTreeMap", K::type_info(), V::type_info())
    }
}
