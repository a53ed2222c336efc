//! Composition root holding one slot pool per namespace.
//!
//! Pools are opened lazily on first use and live as long as the registry.
//! Each pool sits behind its own mutex, so a registry can be shared across
//! threads while every pool keeps a single writer. Build one registry per
//! store; two registries over the same store would each own a copy of the
//! same pools and overwrite each other's state.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::assigner::{Assignment, SlotAssigner};
use crate::config::RegistryConfig;
use crate::error::{Result, SlotError};
use crate::namespace::Namespace;
use crate::store::PersistentStore;
use crate::types::{Binding, OwnerId, SlotIndex};

type SharedPool = Arc<Mutex<SlotAssigner>>;

pub struct SlotRegistry {
    store: Arc<dyn PersistentStore>,
    config: RegistryConfig,
    pools: DashMap<Namespace, SharedPool>,
}

impl SlotRegistry {
    pub fn new(store: Arc<dyn PersistentStore>, config: RegistryConfig) -> Self {
        Self {
            store,
            config,
            pools: DashMap::new(),
        }
    }

    /// Preload every namespace from the store. Failures are logged; the
    /// namespace is then loaded on first use instead.
    pub fn warm_up(&self) {
        for ns in Namespace::ALL {
            if let Err(e) = self.store.warm_up(ns.store_name()) {
                tracing::warn!(namespace = %ns, error = %e, "Failed to warm up store");
            }
        }
    }

    fn pool(&self, namespace: Namespace) -> Result<SharedPool> {
        if let Some(pool) = self.pools.get(&namespace) {
            return Ok(Arc::clone(&pool));
        }

        // The shard lock is held while opening, so racing callers still get
        // a single pool per namespace.
        let pool = self.pools.entry(namespace).or_try_insert_with(|| {
            let capacity = self.config.capacity_for(namespace);
            tracing::debug!(namespace = %namespace, capacity, "Opening slot pool");
            SlotAssigner::open(namespace, capacity, Arc::clone(&self.store))
                .map(|assigner| Arc::new(Mutex::new(assigner)))
        })?;
        Ok(Arc::clone(&pool))
    }

    fn with_pool<T>(
        &self,
        namespace: Namespace,
        f: impl FnOnce(&mut SlotAssigner) -> T,
    ) -> Result<T> {
        let pool = self.pool(namespace)?;
        let mut assigner = pool
            .lock()
            .map_err(|_| SlotError::LockPoisoned(namespace))?;
        Ok(f(&mut assigner))
    }

    /// Assign a slot to `owner` in the namespace its identifier selects.
    pub fn assign(&self, owner: &str) -> Result<Assignment> {
        let owner = OwnerId::new(owner)?;
        let namespace = Namespace::for_owner(owner.as_str());
        self.with_pool(namespace, |assigner| assigner.assign(&owner))
    }

    /// Slot currently held by `owner`, if any.
    pub fn lookup(&self, owner: &str) -> Result<Option<SlotIndex>> {
        if owner.is_empty() {
            return Ok(None);
        }
        self.with_pool(Namespace::for_owner(owner), |assigner| {
            assigner.lookup(owner)
        })
    }

    /// Copy of a namespace's bindings, least recently used first.
    pub fn bindings(&self, namespace: Namespace) -> Result<Vec<Binding>> {
        self.with_pool(namespace, |assigner| assigner.bindings().to_vec())
    }

    /// Rewrite every opened pool to the store. Use after a failed write to
    /// bring persisted state back in line with memory.
    pub fn persist_all(&self) -> Result<()> {
        let mut first_error = None;
        for entry in self.pools.iter() {
            let namespace = *entry.key();
            let result = entry
                .value()
                .lock()
                .map_err(|_| SlotError::LockPoisoned(namespace))
                .and_then(|assigner| assigner.persist().map_err(SlotError::from));
            if let Err(e) = result {
                tracing::warn!(namespace = %namespace, error = %e, "Failed to persist slot pool");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
