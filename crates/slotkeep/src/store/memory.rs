//! In-process store. Nothing survives the process; used by tests and by
//! hosts that provide their own durability around the registry.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{KeyMap, PersistentStore, StoredValue, WriteOp, apply_ops, read_int, read_string};
use crate::error::StoreError;

#[derive(Default)]
pub struct MemoryStore {
    namespaces: Mutex<HashMap<String, KeyMap>>,
    fail_writes: AtomicBool,
    commits: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn namespaces(&self) -> MutexGuard<'_, HashMap<String, KeyMap>> {
        self.namespaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of every key currently stored for `namespace`.
    pub fn snapshot(&self, namespace: &str) -> KeyMap {
        self.namespaces()
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }

    /// Write a raw value, bypassing transactions. Lets callers seed or
    /// corrupt persisted state.
    pub fn insert_raw(&self, namespace: &str, key: impl Into<String>, value: StoredValue) {
        self.namespaces()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.into(), value);
    }

    /// Make every subsequent `apply` fail until turned off again.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    /// Number of successfully committed batches, across all namespaces.
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::Acquire)
    }
}

impl PersistentStore for MemoryStore {
    fn load_int(&self, namespace: &str, key: &str, default: i64) -> Result<i64, StoreError> {
        read_int(self.namespaces().get(namespace), key, default)
    }

    fn load_string(
        &self,
        namespace: &str,
        key: &str,
        default: Option<&str>,
    ) -> Result<Option<String>, StoreError> {
        read_string(self.namespaces().get(namespace), key, default)
    }

    fn apply(&self, namespace: &str, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(StoreError::io(
                namespace,
                io::Error::other("writes disabled"),
            ));
        }

        let mut namespaces = self.namespaces();
        let map = namespaces.entry(namespace.to_string()).or_default();
        apply_ops(map, ops);
        self.commits.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Transaction;

    #[test]
    fn commit_is_visible_to_loads() {
        let store = MemoryStore::new();
        let mut txn = Transaction::begin(&store, "ns");
        txn.put_int("count", 2).put_string("owner", Some("a"));
        txn.commit().unwrap();

        assert_eq!(store.load_int("ns", "count", 0).unwrap(), 2);
        assert_eq!(
            store.load_string("ns", "owner", None).unwrap(),
            Some("a".to_string())
        );
        assert_eq!(store.commits(), 1);
    }

    #[test]
    fn uncommitted_transaction_writes_nothing() {
        let store = MemoryStore::new();
        {
            let mut txn = Transaction::begin(&store, "ns");
            txn.put_int("count", 2);
        }
        assert_eq!(store.load_int("ns", "count", -1).unwrap(), -1);
        assert_eq!(store.commits(), 0);
    }

    #[test]
    fn namespaces_are_disjoint() {
        let store = MemoryStore::new();
        store.insert_raw("a", "k", StoredValue::Int(1));

        assert_eq!(store.load_int("b", "k", 0).unwrap(), 0);
        assert!(store.snapshot("b").is_empty());
        assert_eq!(store.snapshot("a").len(), 1);
    }

    #[test]
    fn failed_writes_leave_state_untouched() {
        let store = MemoryStore::new();
        store.insert_raw("ns", "k", StoredValue::Int(1));
        store.set_fail_writes(true);

        let mut txn = Transaction::begin(&store, "ns");
        txn.clear().put_int("k", 5);
        let err = txn.commit().unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(!err.is_invalid_data());

        assert_eq!(store.load_int("ns", "k", 0).unwrap(), 1);
        assert_eq!(store.commits(), 0);
    }
}
