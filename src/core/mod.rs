pub mod document;
pub mod error;

pub use document::{Document, EntityKey, ID_KEY, Identity, USE_FIELD_NAME};
pub use error::{OdmError, Result};
