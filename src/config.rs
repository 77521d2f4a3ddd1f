use crate::core::{OdmError, Result};
use crate::store::WriteConcern;
use serde::{Deserialize, Serialize};

/// Datastore configuration
///
/// Loadable from JSON; missing keys take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreConfig {
    /// Write concern used when neither the call nor the entity names one
    pub default_write_concern: WriteConcern,

    /// Write `null` field values instead of omitting their keys
    pub store_nulls: bool,
}

impl DatastoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fallback write concern
    pub fn default_write_concern(mut self, concern: WriteConcern) -> Self {
        self.default_write_concern = concern;
        self
    }

    /// Set null storage
    pub fn store_nulls(mut self, store_nulls: bool) -> Self {
        self.store_nulls = store_nulls;
        self
    }

    /// Parse from a JSON object
    ///
    /// ```
    /// # use rustodm::{DatastoreConfig, WriteConcern};
    /// let config = DatastoreConfig::from_json(r#"{"default_write_concern": "majority"}"#).unwrap();
    /// assert_eq!(config.default_write_concern, WriteConcern::Majority);
    /// assert!(!config.store_nulls);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|err| OdmError::Mapping(format!("invalid datastore config: {err}")))
    }
}
