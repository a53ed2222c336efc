//! slotkeep: persistent least-recently-used assignment of owners to a small,
//! fixed pool of reusable slots.

pub mod assigner;
pub mod config;
pub mod error;
pub mod namespace;
pub mod registry;
pub mod store;
pub mod types;

pub use assigner::{Assignment, DEFAULT_CAPACITY, MAX_CAPACITY, MarkUsed, SlotAssigner};
pub use config::RegistryConfig;
pub use error::{SlotError, StoreError};
pub use namespace::{Namespace, WEBAPK_ID_PREFIX};
pub use registry::SlotRegistry;
pub use store::{JsonFileStore, MemoryStore, PersistentStore, Transaction};
pub use types::{Binding, OwnerId, SlotIndex};
