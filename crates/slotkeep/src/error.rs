use std::path::PathBuf;

use thiserror::Error;

use crate::namespace::Namespace;

/// Errors reported by a [`PersistentStore`](crate::store::PersistentStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// A key exists but holds a value of the wrong type.
    #[error("key '{key}' does not hold {expected} value")]
    TypeMismatch { key: String, expected: &'static str },

    /// The backing medium for a namespace could not be parsed.
    #[error("persisted state for '{namespace}' is corrupt: {reason}")]
    Corrupt { namespace: String, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize persisted state: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the stored data itself is unusable, as opposed to the medium
    /// being unreachable. Unusable data is discarded and rebuilt on load.
    pub fn is_invalid_data(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. } | Self::Corrupt { .. })
    }
}

/// Errors surfaced by the slot assigner and registry.
#[derive(Debug, Error)]
pub enum SlotError {
    #[error("owner identifier must not be empty")]
    EmptyOwner,

    #[error("capacity {capacity} for {namespace} is outside 1..={max}")]
    InvalidCapacity {
        namespace: Namespace,
        capacity: usize,
        max: usize,
    },

    #[error("slot pool for {0} is unusable: lock poisoned")]
    LockPoisoned(Namespace),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, SlotError>;
