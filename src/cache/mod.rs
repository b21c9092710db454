//! Cache Module
//!
//! The cache capability contract, the in-memory TTL engine and the
//! filesystem-backed store.

mod clock;
mod codec;
mod entry;
mod file;
mod heap;
mod memory;

#[cfg(test)]
mod property_tests;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

// Re-export public types
pub use clock::{expires_at, Clock, ManualClock, SystemClock};
pub use codec::{Codec, JsonCodec};
pub use entry::CacheEntry;
pub use file::{FileStore, DEFAULT_ROOT_DIR};
pub use heap::ExpiryHeap;
pub use memory::MemoryStore;

// == Public Constants ==
/// Maximum allowed key length in bytes for keys arriving over HTTP
pub const MAX_KEY_LENGTH: usize = 256;

// == Cache Trait ==
/// A cache store with capabilities of setting, reading, deleting and
/// garbage-collecting cache data.
///
/// Every backend implements the same five operations so callers and the GC
/// task can hold any of them as `Arc<dyn Cache<V>>`.
#[async_trait]
pub trait Cache<V>: Send + Sync + 'static {
    /// Returns the value stored under `key`.
    ///
    /// Fails with `CacheError::NotFound` if the key does not exist or has
    /// expired.
    async fn get(&self, key: &str) -> Result<V>;

    /// Stores `value` under `key` for `lifetime`, replacing any existing value.
    async fn set(&self, key: &str, value: V, lifetime: Duration) -> Result<()>;

    /// Removes `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Wipes out all existing data in the cache.
    async fn flush(&self) -> Result<()>;

    /// Removes every expired entry, returning how many were removed.
    async fn gc(&self) -> Result<usize>;
}
