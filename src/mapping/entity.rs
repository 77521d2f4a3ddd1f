use super::annotations::RawField;
use super::class::EntityMapping;
use crate::core::{Document, Result};
use serde_json::Value;

/// Field-level access to a mapped struct, generated by `#[derive(Mapped)]`
/// and `#[derive(Entity)]`.
///
/// Values are keyed by declared field name. Renaming to storage keys,
/// aliasing and transience are applied by the codec from the class metadata.
pub trait Mapped: Sized {
    fn raw_fields() -> Vec<RawField>;

    /// Writes every non-transient field value into `out`.
    fn write_fields(&self, out: &mut Document) -> Result<()>;

    /// Rebuilds the value, consuming entries from `values`.
    fn read_fields(values: &mut Document) -> Result<Self>;

    /// Encoded value of one field; `None` when the struct has no such field.
    fn field_value(&self, declared_name: &str) -> Result<Option<Value>>;
}

/// A mapped type stored as a top-level document in its own collection.
pub trait Entity: Mapped + Send + Sync + 'static {
    fn entity_mapping() -> EntityMapping;

    fn pre_persist(&self, _document: &mut Document) -> Result<()> {
        Ok(())
    }

    fn post_persist(&self, _document: &Document) -> Result<()> {
        Ok(())
    }

    fn post_load(&mut self, _document: &Document) -> Result<()> {
        Ok(())
    }
}

/// Hand-written lifecycle callbacks.
///
/// Bind them with `#[entity(lifecycle(pre_persist, post_persist, post_load))]`;
/// unbound hooks are never called.
pub trait EntityLifecycle {
    fn pre_persist(&self, _document: &mut Document) -> Result<()> {
        Ok(())
    }

    fn post_persist(&self, _document: &Document) -> Result<()> {
        Ok(())
    }

    fn post_load(&mut self, _document: &Document) -> Result<()> {
        Ok(())
    }
}
