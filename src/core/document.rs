use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Generic stored document: string keys, dynamically typed values.
pub type Document = serde_json::Map<String, Value>;

/// Reserved storage key of the identity field.
pub const ID_KEY: &str = "_id";

/// Marker value meaning "use the declared field name" in name-bearing annotations.
pub const USE_FIELD_NAME: &str = ".";

/// Identity value of a stored entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(Value);

impl Identity {
    pub fn new(value: impl Into<Value>) -> Self {
        Self(value.into())
    }

    /// Fresh store-assigned identity.
    pub fn generate() -> Self {
        Self(Value::String(Uuid::new_v4().to_string()))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn as_str(&self) -> Option<&str> {
        self.0.as_str()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => write!(f, "{s}"),
            other => write!(f, "{other}"),
        }
    }
}

impl From<Value> for Identity {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(Value::String(value.to_string()))
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(Value::String(value))
    }
}

impl From<i64> for Identity {
    fn from(value: i64) -> Self {
        Self(Value::from(value))
    }
}

impl From<Uuid> for Identity {
    fn from(value: Uuid) -> Self {
        Self(Value::String(value.to_string()))
    }
}

/// Pointer to a stored entity of another collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityKey {
    pub collection: String,
    pub id: Identity,
}

impl EntityKey {
    pub fn new(collection: impl Into<String>, id: impl Into<Identity>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.collection, self.id)
    }
}
