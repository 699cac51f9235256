//! Shared cache store abstraction
//!
//! The proxy keeps its cache in an external key-value store so that entries
//! survive restarts and are shared across worker instances. The store holds
//! one hash per entry, keyed by the derived cache key; field layout is
//! defined by [`CacheEntry::to_fields`](crate::entry::CacheEntry::to_fields).
//!
//! Two backends implement the trait:
//!
//! - [`ValkeyStore`]: Valkey/Redis over TCP or a unix socket, the production
//!   backend shared between proxy instances
//! - [`MemoryStore`]: process-local HashMap, for development and tests
//!
//! Any task may read concurrently; mutations must go through the write
//! serializer (see [`crate::writer`]) so that only one task touches the
//! store at a time within a proxy instance.

pub mod error;
pub mod memory;
pub mod valkey;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use valkey::ValkeyStore;

use crate::entry::CacheEntry;
use async_trait::async_trait;

/// Narrow interface over the shared key-value store
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up an entry by its cache key.
    ///
    /// Absence is `Ok(None)`, not an error. `StoreError::Corrupt` means the
    /// key exists but its fields cannot be decoded.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError>;

    /// Write an entry in full under `entry.cache_key`, as a single
    /// multi-field hash write.
    async fn put(&self, entry: &CacheEntry) -> Result<(), StoreError>;

    /// Remove an entry. Succeeds whether or not the key existed.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Enumerate all cache keys starting with `prefix`.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Connectivity probe; used as the fatal startup check.
    async fn ping(&self) -> Result<(), StoreError>;
}
