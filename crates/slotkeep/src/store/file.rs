//! File-backed store: one JSON document per namespace.
//!
//! Documents are cached after the first read. Every commit rewrites the whole
//! document through a temporary sibling file that is renamed over the target,
//! so readers never observe a partial write.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use super::{KeyMap, PersistentStore, WriteOp, apply_ops, read_int, read_string};
use crate::error::StoreError;

pub struct JsonFileStore {
    root: PathBuf,
    cache: Mutex<HashMap<String, KeyMap>>,
}

impl JsonFileStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        Ok(Self {
            root,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Path of the document holding `namespace`.
    pub fn path_for(&self, namespace: &str) -> PathBuf {
        self.root.join(format!("{namespace}.json"))
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, KeyMap>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_document(&self, namespace: &str) -> Result<KeyMap, StoreError> {
        let path = self.path_for(namespace);
        let started = Instant::now();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(KeyMap::new()),
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        let map = serde_json::from_slice::<KeyMap>(&bytes).map_err(|e| StoreError::Corrupt {
            namespace: namespace.to_string(),
            reason: e.to_string(),
        })?;

        tracing::debug!(
            namespace,
            keys = map.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "Loaded store document"
        );
        Ok(map)
    }

    /// Run `f` against the cached document, loading it on first use.
    fn with_document<T>(
        &self,
        namespace: &str,
        f: impl FnOnce(&KeyMap) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut cache = self.cache();
        if let Some(map) = cache.get(namespace) {
            return f(map);
        }
        let map = self.read_document(namespace)?;
        let result = f(&map);
        cache.insert(namespace.to_string(), map);
        result
    }

    fn write_document(&self, namespace: &str, map: &KeyMap) -> Result<(), StoreError> {
        let path = self.path_for(namespace);
        let tmp = self.root.join(format!(".{namespace}.json.tmp"));

        let json = serde_json::to_vec_pretty(map)?;
        let mut file = fs::File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        file.write_all(&json)
            .and_then(|_| file.sync_all())
            .map_err(|e| StoreError::io(&tmp, e))?;
        drop(file);

        fs::rename(&tmp, &path).map_err(|e| StoreError::io(&path, e))?;
        tracing::debug!(namespace, bytes = json.len(), "Wrote store document");
        Ok(())
    }
}

impl PersistentStore for JsonFileStore {
    fn load_int(&self, namespace: &str, key: &str, default: i64) -> Result<i64, StoreError> {
        self.with_document(namespace, |map| read_int(Some(map), key, default))
    }

    fn load_string(
        &self,
        namespace: &str,
        key: &str,
        default: Option<&str>,
    ) -> Result<Option<String>, StoreError> {
        self.with_document(namespace, |map| read_string(Some(map), key, default))
    }

    fn apply(&self, namespace: &str, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let mut cache = self.cache();

        // A leading clear replaces the document, so a corrupt file on disk
        // does not block the rewrite that repairs it.
        let mut next = match (ops.first(), cache.get(namespace)) {
            (Some(WriteOp::Clear), _) => KeyMap::new(),
            (_, Some(map)) => map.clone(),
            (_, None) => self.read_document(namespace)?,
        };
        apply_ops(&mut next, ops);

        self.write_document(namespace, &next)?;
        cache.insert(namespace.to_string(), next);
        Ok(())
    }

    fn warm_up(&self, namespace: &str) -> Result<(), StoreError> {
        self.with_document(namespace, |_| Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Transaction;

    #[test]
    fn missing_document_reads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();

        assert_eq!(store.load_int("ns", "count", 3).unwrap(), 3);
        assert_eq!(store.load_string("ns", "owner", None).unwrap(), None);
        assert!(!store.path_for("ns").exists());
    }

    #[test]
    fn commit_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonFileStore::open(dir.path()).unwrap();
            let mut txn = Transaction::begin(&store, "ns");
            txn.clear()
                .put_int("count", 1)
                .put_string("owner0", Some("a"))
                .put_string("owner1", None);
            txn.commit().unwrap();
        }

        let store = JsonFileStore::open(dir.path()).unwrap();
        assert_eq!(store.load_int("ns", "count", 0).unwrap(), 1);
        assert_eq!(
            store.load_string("ns", "owner0", None).unwrap(),
            Some("a".to_string())
        );
        assert_eq!(store.load_string("ns", "owner1", None).unwrap(), None);

        let on_disk: KeyMap =
            serde_json::from_slice(&fs::read(store.path_for("ns")).unwrap()).unwrap();
        insta::assert_json_snapshot!(on_disk, @r#"
        {
          "count": 1,
          "owner0": "a"
        }
        "#);
    }

    #[test]
    fn corrupt_document_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        fs::write(store.path_for("ns"), b"{not json").unwrap();

        let err = store.load_int("ns", "count", 0).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
        assert!(err.is_invalid_data());
    }

    #[test]
    fn clearing_write_repairs_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        fs::write(store.path_for("ns"), b"[1, 2").unwrap();

        let mut txn = Transaction::begin(&store, "ns");
        txn.clear().put_int("count", 0);
        txn.commit().unwrap();

        let reopened = JsonFileStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load_int("ns", "count", -1).unwrap(), 0);
    }

    #[test]
    fn incremental_write_keeps_existing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        fs::write(store.path_for("ns"), br#"{"kept": "yes"}"#).unwrap();

        let mut txn = Transaction::begin(&store, "ns");
        txn.put_int("added", 4);
        txn.commit().unwrap();

        let reopened = JsonFileStore::open(dir.path()).unwrap();
        assert_eq!(
            reopened.load_string("ns", "kept", None).unwrap(),
            Some("yes".to_string())
        );
        assert_eq!(reopened.load_int("ns", "added", 0).unwrap(), 4);
    }

    #[test]
    fn warm_up_serves_reads_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        fs::write(store.path_for("ns"), br#"{"count": 2}"#).unwrap();

        store.warm_up("ns").unwrap();
        fs::remove_file(store.path_for("ns")).unwrap();

        assert_eq!(store.load_int("ns", "count", 0).unwrap(), 2);
    }

    #[test]
    fn wrong_type_on_disk_is_type_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        fs::write(store.path_for("ns"), br#"{"count": "three"}"#).unwrap();

        assert!(matches!(
            store.load_int("ns", "count", 0),
            Err(StoreError::TypeMismatch { .. })
        ));
        assert_eq!(
            store.load_string("ns", "count", None).unwrap(),
            Some("three".to_string())
        );
    }
}
