use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OdmError {
    #[error("Classification error on field '{field}': {reason}")]
    Classification { field: String, reason: String },

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error(
        "Entity of type {type_name} (id='{identity}', version={expected_version}) was concurrently updated"
    )]
    ConcurrentModification {
        type_name: String,
        identity: String,
        expected_version: i64,
    },

    #[error("Update error: {0}")]
    Update(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl OdmError {
    pub fn classification(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Classification {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True for version mismatches the caller may resolve by re-reading and retrying.
    pub fn is_concurrent_modification(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }

    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, OdmError>;

impl<T> From<std::sync::PoisonError<T>> for OdmError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
