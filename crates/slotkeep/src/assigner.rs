//! Least-recently-used assignment of owners to a fixed pool of slots.
//!
//! The pool is an ordered list holding every physical slot exactly once. The
//! front is the least recently used slot, the back the most recently used.
//! Assigning an owner that already holds a slot reuses it; otherwise the front
//! slot is reclaimed and its previous owner is evicted without notice. Either
//! way the slot moves to the back.
//!
//! Example with three slots and owners X, Y, Z, W:
//!
//! ```text
//!    action        effect                               list
//! 0) clean slate                                        (0 -) (1 -) (2 -)
//! 1) assign X      slot 0, pushed back                  (1 -) (2 -) (0 X)
//! 2) assign Y      slot 1, pushed back                  (2 -) (0 X) (1 Y)
//! 3) assign Z      slot 2, pushed back                  (0 X) (1 Y) (2 Z)
//! 4) assign Y      reused slot 1, pushed back           (0 X) (2 Z) (1 Y)
//! 5) assign W      slot 0, X evicted                    (2 Z) (1 Y) (0 W)
//! 6) assign X      slot 2, Z evicted                    (1 Y) (0 W) (2 X)
//! ```
//!
//! The full list is rewritten to the store after every mutation. On open, the
//! persisted list is reconciled against the configured capacity: duplicate and
//! out-of-range slots are dropped, missing slots are appended unassigned, and
//! unreadable state is discarded entirely.
//!
//! A `SlotAssigner` has no internal locking. Callers sharing one across
//! threads must serialize access; [`SlotRegistry`](crate::SlotRegistry) does.

use std::sync::Arc;
use std::time::Instant;

use crate::error::{SlotError, StoreError};
use crate::namespace::Namespace;
use crate::store::{PersistentStore, Transaction};
use crate::types::{Binding, OwnerId, SlotIndex};

/// Number of slots per namespace unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 10;

/// Upper bound on any pool's capacity, also the most entries ever read back.
pub const MAX_CAPACITY: usize = 100;

/// Outcome of [`SlotAssigner::assign`].
#[derive(Debug)]
#[must_use = "the persistence result should be checked or logged"]
pub struct Assignment {
    pub slot: SlotIndex,
    /// Previous owner of a reclaimed slot. It is not notified.
    pub evicted: Option<OwnerId>,
    /// Result of the write that followed the assignment. The in-memory pool
    /// is updated regardless.
    pub persist: Result<(), StoreError>,
}

/// Outcome of [`SlotAssigner::mark_used`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkUsed {
    Applied,
    /// The slot is not in the pool. Nothing changed and nothing was written.
    Skipped,
}

struct Replay {
    bindings: Vec<Binding>,
    dropped: usize,
}

pub struct SlotAssigner {
    namespace: Namespace,
    capacity: usize,
    bindings: Vec<Binding>,
    store: Arc<dyn PersistentStore>,
}

impl SlotAssigner {
    /// Open the pool for `namespace`, restoring and reconciling persisted state.
    ///
    /// Fails only on an out-of-range capacity or when the store cannot be read
    /// at all. Unusable persisted data is rebuilt rather than reported, and a
    /// failed normalizing write is logged.
    pub fn open(
        namespace: Namespace,
        capacity: usize,
        store: Arc<dyn PersistentStore>,
    ) -> Result<Self, SlotError> {
        if capacity == 0 || capacity > MAX_CAPACITY {
            return Err(SlotError::InvalidCapacity {
                namespace,
                capacity,
                max: MAX_CAPACITY,
            });
        }

        let mut assigner = Self {
            namespace,
            capacity,
            bindings: Vec::with_capacity(capacity),
            store,
        };
        assigner.restore()?;
        Ok(assigner)
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bindings from least to most recently used.
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Give `owner` a slot, reusing its current one or reclaiming the least
    /// recently used. Always succeeds in memory, then persists.
    pub fn assign(&mut self, owner: &OwnerId) -> Assignment {
        let (slot, evicted) = match self.lookup(owner.as_str()) {
            Some(slot) => (slot, None),
            None => {
                // The pool always holds `capacity >= 1` bindings.
                let front = &mut self.bindings[0];
                (front.slot, front.owner.replace(owner.clone()))
            }
        };

        if let Some(evicted) = &evicted {
            tracing::info!(
                namespace = %self.namespace,
                slot = %slot,
                owner = %owner,
                evicted = %evicted,
                "Evicted least recently used owner"
            );
        } else {
            tracing::debug!(namespace = %self.namespace, slot = %slot, owner = %owner, "Assigned slot");
        }

        self.promote(slot, owner);
        let persist = self.persist();
        if let Err(e) = &persist {
            tracing::warn!(namespace = %self.namespace, error = %e, "Failed to persist slot assignment");
        }

        Assignment {
            slot,
            evicted,
            persist,
        }
    }

    /// Slot currently held by `owner`, scanning from most to least recently
    /// used so the most recent binding wins.
    pub fn lookup(&self, owner: &str) -> Option<SlotIndex> {
        if owner.is_empty() {
            return None;
        }
        self.bindings
            .iter()
            .rev()
            .find(|b| b.is_owned_by(owner))
            .map(|b| b.slot)
    }

    /// Move `slot` to the most recently used position and (re)bind it to
    /// `owner`, then persist.
    pub fn mark_used(&mut self, slot: SlotIndex, owner: &OwnerId) -> Result<MarkUsed, StoreError> {
        if !self.promote(slot, owner) {
            tracing::error!(
                namespace = %self.namespace,
                slot = %slot,
                owner = %owner,
                "Bug: slot missing from pool"
            );
            return Ok(MarkUsed::Skipped);
        }
        self.persist()?;
        Ok(MarkUsed::Applied)
    }

    fn promote(&mut self, slot: SlotIndex, owner: &OwnerId) -> bool {
        let Some(position) = self.bindings.iter().position(|b| b.slot == slot) else {
            return false;
        };
        self.bindings.remove(position);
        self.bindings.push(Binding::owned(slot, owner.clone()));
        true
    }

    /// Replace the namespace's persisted state with the full current list.
    pub fn persist(&self) -> Result<(), StoreError> {
        let started = Instant::now();
        let ns = self.namespace;

        let mut txn = Transaction::begin(self.store.as_ref(), ns.store_name());
        txn.clear().put_int(ns.count_key(), self.bindings.len() as i64);
        for (position, binding) in self.bindings.iter().enumerate() {
            txn.put_int(ns.slot_key(position), i64::from(binding.slot.get()))
                .put_string(
                    ns.owner_key(position),
                    binding.owner.as_ref().map(OwnerId::as_str),
                );
        }
        txn.commit()?;

        tracing::debug!(
            namespace = %ns,
            elapsed_us = started.elapsed().as_micros() as u64,
            "Persisted slot bindings"
        );
        Ok(())
    }

    fn restore(&mut self) -> Result<(), StoreError> {
        let started = Instant::now();

        let replay = match self.load_persisted() {
            Ok(replay) => replay,
            Err(e) if e.is_invalid_data() => {
                tracing::warn!(
                    namespace = %self.namespace,
                    error = %e,
                    "Persisted slot bindings unreadable, rebuilding"
                );
                Replay {
                    bindings: Vec::new(),
                    dropped: 0,
                }
            }
            Err(e) => return Err(e),
        };

        let mut claimed = vec![false; self.capacity];
        for binding in &replay.bindings {
            claimed[binding.slot.as_usize()] = true;
        }
        self.bindings = replay.bindings;

        let mut missing = 0;
        for (index, _) in claimed.iter().enumerate().filter(|(_, c)| !**c) {
            self.bindings.push(Binding::unassigned(SlotIndex::new(index as u32)));
            missing += 1;
        }

        tracing::debug!(
            namespace = %self.namespace,
            restored = self.capacity - missing,
            dropped = replay.dropped,
            missing,
            elapsed_us = started.elapsed().as_micros() as u64,
            "Restored slot bindings"
        );

        if (replay.dropped > 0 || missing > 0)
            && let Err(e) = self.persist()
        {
            tracing::warn!(
                namespace = %self.namespace,
                error = %e,
                "Failed to persist reconciled slot bindings"
            );
        }
        Ok(())
    }

    /// Read the persisted list, keeping the first binding for each in-range
    /// slot and dropping the rest.
    fn load_persisted(&self) -> Result<Replay, StoreError> {
        let ns = self.namespace;
        let store_name = ns.store_name();

        let count = self.store.load_int(store_name, ns.count_key(), 0)?;
        if count > self.capacity as i64 {
            tracing::warn!(
                namespace = %ns,
                count,
                capacity = self.capacity,
                "Persisted binding count exceeds capacity, rebuilding"
            );
            return Ok(Replay {
                bindings: Vec::new(),
                dropped: 0,
            });
        }

        let mut claimed = vec![false; self.capacity];
        let mut replay = Replay {
            bindings: Vec::with_capacity(self.capacity),
            dropped: 0,
        };

        for position in 0..count.max(0) as usize {
            let raw_slot = self
                .store
                .load_int(store_name, &ns.slot_key(position), position as i64)?;
            let owner = self
                .store
                .load_string(store_name, &ns.owner_key(position), None)?
                .and_then(|id| OwnerId::new(id).ok());

            let slot = usize::try_from(raw_slot)
                .ok()
                .filter(|&s| s < self.capacity && !claimed[s]);
            match slot {
                Some(s) => {
                    claimed[s] = true;
                    replay
                        .bindings
                        .push(Binding { slot: SlotIndex::new(s as u32), owner });
                }
                None => {
                    tracing::debug!(
                        namespace = %ns,
                        position,
                        slot = raw_slot,
                        "Dropping duplicate or out-of-range persisted binding"
                    );
                    replay.dropped += 1;
                }
            }
        }
        Ok(replay)
    }
}
