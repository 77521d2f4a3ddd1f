//! Boundary to the document-store driver.
//!
//! The coordinator only speaks the vocabulary defined here: equality and
//! membership filters, set/unset/inc mutations, and single-document
//! conditional replaces. Connection handling, wire encoding and I/O belong
//! to the `DocumentStore` implementation.

use crate::core::Document;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod memory;

pub use memory::MemoryStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Duplicate key {key} in collection '{collection}'")]
    DuplicateKey { collection: String, key: String },

    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    #[error("Store error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Acknowledgement level requested from the store for a write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteConcern {
    Unacknowledged,
    #[default]
    Acknowledged,
    Journaled,
    Majority,
}

impl fmt::Display for WriteConcern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unacknowledged => "unacknowledged",
            Self::Acknowledged => "acknowledged",
            Self::Journaled => "journaled",
            Self::Majority => "majority",
        };
        write!(f, "{label}")
    }
}

impl FromStr for WriteConcern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unacknowledged" | "w0" => Ok(Self::Unacknowledged),
            "acknowledged" | "w1" => Ok(Self::Acknowledged),
            "journaled" => Ok(Self::Journaled),
            "majority" => Ok(Self::Majority),
            other => Err(format!("unknown write concern '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub concern: Option<WriteConcern>,
    pub bypass_document_validation: bool,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn concern(mut self, concern: WriteConcern) -> Self {
        self.concern = Some(concern);
        self
    }

    pub fn bypass_document_validation(mut self, bypass: bool) -> Self {
        self.bypass_document_validation = bypass;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    pub upsert: bool,
    pub concern: Option<WriteConcern>,
}

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    pub fn concern(mut self, concern: WriteConcern) -> Self {
        self.concern = Some(concern);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_id: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    In(String, Vec<Value>),
}

impl Condition {
    pub fn key(&self) -> &str {
        match self {
            Self::Eq(key, _) | Self::In(key, _) => key,
        }
    }

    fn with_key(&self, key: String) -> Self {
        match self {
            Self::Eq(_, value) => Self::Eq(key, value.clone()),
            Self::In(_, values) => Self::In(key, values.clone()),
        }
    }

    fn matches(&self, document: &Document) -> bool {
        let actual = lookup_path(document, self.key()).unwrap_or(&Value::Null);
        match self {
            Self::Eq(_, expected) => values_equal(actual, expected),
            Self::In(_, candidates) => candidates.iter().any(|c| values_equal(actual, c)),
        }
    }
}

/// Conjunction of conditions; an empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<Value>) -> Self {
        Self::new().eq(crate::core::ID_KEY, id)
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(key.into(), value.into()));
        self
    }

    pub fn is_in<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.conditions.push(Condition::In(
            key.into(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Value of the first equality condition on `key`.
    pub fn equality_value(&self, key: &str) -> Option<&Value> {
        self.conditions.iter().find_map(|c| match c {
            Condition::Eq(k, v) if k == key => Some(v),
            _ => None,
        })
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.conditions.iter().all(|c| c.matches(document))
    }

    /// Rewrites every key, e.g. declared field names into storage keys.
    pub fn map_keys<E>(&self, mut map: impl FnMut(&str) -> Result<String, E>) -> Result<Self, E> {
        let conditions = self
            .conditions
            .iter()
            .map(|c| map(c.key()).map(|key| c.with_key(key)))
            .collect::<Result<Vec<_>, E>>()?;
        Ok(Self { conditions })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set(String, Value),
    Unset(String),
    Inc(String, i64),
}

impl UpdateOp {
    pub fn key(&self) -> &str {
        match self {
            Self::Set(key, _) | Self::Unset(key) | Self::Inc(key, _) => key,
        }
    }

    fn with_key(&self, key: String) -> Self {
        match self {
            Self::Set(_, value) => Self::Set(key, value.clone()),
            Self::Unset(_) => Self::Unset(key),
            Self::Inc(_, amount) => Self::Inc(key, *amount),
        }
    }
}

/// Ordered set of field mutations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOperations {
    ops: Vec<UpdateOp>,
}

impl UpdateOperations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set(key.into(), value.into()));
        self
    }

    pub fn unset(mut self, key: impl Into<String>) -> Self {
        self.ops.push(UpdateOp::Unset(key.into()));
        self
    }

    pub fn inc(mut self, key: impl Into<String>, amount: i64) -> Self {
        self.ops.push(UpdateOp::Inc(key.into(), amount));
        self
    }

    /// One `set` per entry of `document`.
    pub fn set_all(document: Document) -> Self {
        Self {
            ops: document
                .into_iter()
                .map(|(key, value)| UpdateOp::Set(key, value))
                .collect(),
        }
    }

    pub fn push(&mut self, op: UpdateOp) {
        self.ops.push(op);
    }

    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn increments(&self, key: &str) -> bool {
        self.ops
            .iter()
            .any(|op| matches!(op, UpdateOp::Inc(k, _) if k == key))
    }

    pub fn map_keys<E>(&self, mut map: impl FnMut(&str) -> Result<String, E>) -> Result<Self, E> {
        let ops = self
            .ops
            .iter()
            .map(|op| map(op.key()).map(|key| op.with_key(key)))
            .collect::<Result<Vec<_>, E>>()?;
        Ok(Self { ops })
    }

    /// Applies every mutation to `document` in order.
    pub fn apply(&self, document: &mut Document) -> StoreResult<()> {
        for op in &self.ops {
            match op {
                UpdateOp::Set(key, value) => {
                    document.insert(key.clone(), value.clone());
                }
                UpdateOp::Unset(key) => {
                    document.remove(key);
                }
                UpdateOp::Inc(key, amount) => {
                    let next = match document.get(key) {
                        None | Some(Value::Null) => Value::from(*amount),
                        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => {
                            let current = n.as_i64().ok_or_else(|| {
                                StoreError::InvalidUpdate(format!("'{key}' overflows i64"))
                            })?;
                            Value::from(current.checked_add(*amount).ok_or_else(|| {
                                StoreError::InvalidUpdate(format!("increment of '{key}' overflows"))
                            })?)
                        }
                        Some(Value::Number(n)) => {
                            Value::from(n.as_f64().unwrap_or_default() + *amount as f64)
                        }
                        Some(other) => {
                            return Err(StoreError::InvalidUpdate(format!(
                                "cannot increment non-numeric field '{key}' ({other})"
                            )));
                        }
                    };
                    document.insert(key.clone(), next);
                }
            }
        }
        Ok(())
    }
}

/// Driver operations the coordinator relies on.
///
/// Every method is one round trip. Single-document operations must be
/// atomic: `replace_one` matches and replaces as one indivisible step.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a document, assigning an identity when it has none. Returns the identity.
    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        options: &WriteOptions,
    ) -> StoreResult<Value>;

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        options: &WriteOptions,
    ) -> StoreResult<Vec<Value>>;

    /// Replaces the first document matching `filter`; inserts when `upsert` and nothing matched.
    async fn replace_one(
        &self,
        collection: &str,
        filter: &Filter,
        replacement: Document,
        upsert: bool,
        options: &WriteOptions,
    ) -> StoreResult<UpdateResult>;

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateOperations,
        options: &UpdateOptions,
    ) -> StoreResult<UpdateResult>;

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateOperations,
        options: &UpdateOptions,
    ) -> StoreResult<UpdateResult>;

    /// Atomically updates the first match and returns it, before or after the update.
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateOperations,
        return_new: bool,
    ) -> StoreResult<Option<Document>>;

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Document>>;

    async fn delete_many(
        &self,
        collection: &str,
        filter: &Filter,
        options: &WriteOptions,
    ) -> StoreResult<DeleteResult>;

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;
}

fn lookup_path<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Numbers compare by value so that `5` and `5.0` match.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        _ => left == right,
    }
}
