//! Durable key/value storage for pool state.
//!
//! Each namespace owns an independent key space. Reads are typed: a key that
//! exists with the wrong value type is reported as [`StoreError::TypeMismatch`]
//! rather than coerced. Writes are buffered in a [`Transaction`] and applied
//! as one atomic batch.

mod file;
mod memory;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// A persisted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredValue {
    Int(i64),
    Str(String),
}

/// Ordered key space of one namespace.
pub type KeyMap = BTreeMap<String, StoredValue>;

/// A single buffered write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Remove every key in the namespace.
    Clear,
    PutInt(String, i64),
    /// `None` removes the key.
    PutString(String, Option<String>),
}

/// Backing medium for persisted pool state.
pub trait PersistentStore: Send + Sync {
    fn load_int(&self, namespace: &str, key: &str, default: i64) -> Result<i64, StoreError>;

    fn load_string(
        &self,
        namespace: &str,
        key: &str,
        default: Option<&str>,
    ) -> Result<Option<String>, StoreError>;

    /// Apply a batch of writes atomically: either every op lands or none do.
    fn apply(&self, namespace: &str, ops: Vec<WriteOp>) -> Result<(), StoreError>;

    /// Preload a namespace so later reads do not touch the medium.
    fn warm_up(&self, _namespace: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Buffered writes against one namespace, submitted on [`commit`](Self::commit).
#[must_use = "writes are discarded unless committed"]
pub struct Transaction<'a> {
    store: &'a dyn PersistentStore,
    namespace: &'a str,
    ops: Vec<WriteOp>,
}

impl<'a> Transaction<'a> {
    pub fn begin(store: &'a dyn PersistentStore, namespace: &'a str) -> Self {
        Self {
            store,
            namespace,
            ops: Vec::new(),
        }
    }

    pub fn clear(&mut self) -> &mut Self {
        self.ops.push(WriteOp::Clear);
        self
    }

    pub fn put_int(&mut self, key: impl Into<String>, value: i64) -> &mut Self {
        self.ops.push(WriteOp::PutInt(key.into(), value));
        self
    }

    pub fn put_string(&mut self, key: impl Into<String>, value: Option<&str>) -> &mut Self {
        self.ops
            .push(WriteOp::PutString(key.into(), value.map(str::to_string)));
        self
    }

    pub fn commit(self) -> Result<(), StoreError> {
        self.store.apply(self.namespace, self.ops)
    }
}

pub(crate) fn read_int(map: Option<&KeyMap>, key: &str, default: i64) -> Result<i64, StoreError> {
    match map.and_then(|m| m.get(key)) {
        None => Ok(default),
        Some(StoredValue::Int(v)) => Ok(*v),
        Some(StoredValue::Str(_)) => Err(StoreError::TypeMismatch {
            key: key.to_string(),
            expected: "an integer",
        }),
    }
}

pub(crate) fn read_string(
    map: Option<&KeyMap>,
    key: &str,
    default: Option<&str>,
) -> Result<Option<String>, StoreError> {
    match map.and_then(|m| m.get(key)) {
        None => Ok(default.map(str::to_string)),
        Some(StoredValue::Str(v)) => Ok(Some(v.clone())),
        Some(StoredValue::Int(_)) => Err(StoreError::TypeMismatch {
            key: key.to_string(),
            expected: "a string",
        }),
    }
}

pub(crate) fn apply_ops(map: &mut KeyMap, ops: Vec<WriteOp>) {
    for op in ops {
        match op {
            WriteOp::Clear => map.clear(),
            WriteOp::PutInt(key, value) => {
                map.insert(key, StoredValue::Int(value));
            }
            WriteOp::PutString(key, Some(value)) => {
                map.insert(key, StoredValue::Str(value));
            }
            WriteOp::PutString(key, None) => {
                map.remove(&key);
            }
        }
    }
}
