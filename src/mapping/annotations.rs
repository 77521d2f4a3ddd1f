use super::type_info::TypeInfo;
use crate::core::USE_FIELD_NAME;

/// Mapping annotation attached to a field declaration.
///
/// Name-bearing variants hold [`USE_FIELD_NAME`] when no explicit key was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    Id,
    Property(String),
    Reference(String),
    Embedded(String),
    Serialized(String),
    Version(String),
    AlsoLoad(Vec<String>),
    Transient,
    NotSaved,
    /// Anything the mapper does not recognize. Carried, never interpreted.
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationKind {
    Id,
    Property,
    Reference,
    Embedded,
    Serialized,
    Version,
    AlsoLoad,
    Transient,
    NotSaved,
}

impl Annotation {
    pub fn property(name: impl Into<String>) -> Self {
        Self::Property(name.into())
    }

    pub fn version() -> Self {
        Self::Version(USE_FIELD_NAME.to_string())
    }

    pub fn also_load<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AlsoLoad(names.into_iter().map(Into::into).collect())
    }

    /// `None` for annotations the mapper ignores.
    pub fn kind(&self) -> Option<AnnotationKind> {
        match self {
            Self::Id => Some(AnnotationKind::Id),
            Self::Property(_) => Some(AnnotationKind::Property),
            Self::Reference(_) => Some(AnnotationKind::Reference),
            Self::Embedded(_) => Some(AnnotationKind::Embedded),
            Self::Serialized(_) => Some(AnnotationKind::Serialized),
            Self::Version(_) => Some(AnnotationKind::Version),
            Self::AlsoLoad(_) => Some(AnnotationKind::AlsoLoad),
            Self::Transient => Some(AnnotationKind::Transient),
            Self::NotSaved => Some(AnnotationKind::NotSaved),
            Self::Other(_) => None,
        }
    }

    /// Explicit storage name carried by the annotation, if it has one.
    pub fn explicit_name(&self) -> Option<&str> {
        match self {
            Self::Property(name)
            | Self::Reference(name)
            | Self::Embedded(name)
            | Self::Serialized(name)
            | Self::Version(name) => Some(name.as_str()),
            _ => None,
        }
    }
}

/// Unclassified field declaration as produced by `#[derive(Entity)]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawField {
    pub name: String,
    pub declared_in: String,
    pub type_info: TypeInfo,
    pub annotations: Vec<Annotation>,
}

impl RawField {
    pub fn new(name: impl Into<String>, declared_in: impl Into<String>, type_info: TypeInfo) -> Self {
        Self {
            name: name.into(),
            declared_in: declared_in.into(),
            type_info,
            annotations: Vec::new(),
        }
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn with_annotations(mut self, annotations: Vec<Annotation>) -> Self {
        self.annotations.extend(annotations);
        self
    }
}
