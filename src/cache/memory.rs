//! Memory Store Module
//!
//! In-process cache engine: an expiry heap behind a single readers-writer
//! lock, with lazy expiration on read and heap-ordered garbage collection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::{expires_at, Cache, CacheEntry, Clock, ExpiryHeap, SystemClock};
use crate::error::{CacheError, Result};

// == Memory Store ==
/// In-memory implementation of the cache store.
///
/// Cloning is cheap and yields a handle to the same entries.
pub struct MemoryStore<V> {
    /// Source of "now" for computing and checking expiration
    clock: Arc<dyn Clock>,
    /// Entries ordered by expiration, guarded by one lock
    heap: Arc<RwLock<ExpiryHeap<V>>>,
}

impl<V> Clone for MemoryStore<V> {
    fn clone(&self) -> Self {
        Self {
            clock: Arc::clone(&self.clock),
            heap: Arc::clone(&self.heap),
        }
    }
}

impl<V> MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates an empty store using the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store using the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            heap: Arc::new(RwLock::new(ExpiryHeap::new())),
        }
    }

    // == Length ==
    /// Number of entries physically held, expired or not.
    pub async fn len(&self) -> usize {
        self.heap.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.heap.read().await.is_empty()
    }

    // == Expire In Background ==
    /// Removes `key` on a separate task if it is still stored and still expired.
    ///
    /// A concurrent delete, GC or flush may already have removed the key, and a
    /// concurrent set may have given it a fresh lifetime. Both leave the entry
    /// alone. Outside a tokio runtime nothing is scheduled and the entry waits
    /// for the next GC.
    fn expire_in_background(&self, key: String) {
        let Ok(runtime) = Handle::try_current() else {
            debug!("No runtime to expire key {}, leaving it for GC", key);
            return;
        };
        let heap = Arc::clone(&self.heap);
        let clock = Arc::clone(&self.clock);

        runtime.spawn(async move {
            let mut heap = heap.write().await;
            let now = clock.now();
            let expired = heap.get(&key).is_some_and(|entry| entry.is_expired(now));
            if expired {
                heap.remove(&key);
                debug!("Lazily removed expired key: {}", key);
            }
        });
    }

    // == Pop Expired ==
    /// Removes the earliest entry if it expired at `now`.
    ///
    /// Holds the write lock for one heap removal only.
    async fn pop_expired(&self, now: DateTime<Utc>) -> bool {
        let mut heap = self.heap.write().await;
        if heap.peek_min().is_some_and(|entry| entry.is_expired(now)) {
            heap.pop_min();
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    pub(crate) async fn assert_invariants(&self) {
        self.heap.read().await.assert_invariants();
    }
}

impl<V> Default for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> Cache<V> for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<V> {
        let heap = self.heap.read().await;

        let Some(entry) = heap.get(key) else {
            return Err(CacheError::NotFound(key.to_string()));
        };

        if entry.is_expired(self.clock.now()) {
            drop(heap);
            self.expire_in_background(key.to_string());
            return Err(CacheError::NotFound(key.to_string()));
        }

        Ok(entry.value.clone())
    }

    async fn set(&self, key: &str, value: V, lifetime: Duration) -> Result<()> {
        let expires_at = expires_at(self.clock.now(), lifetime);

        let mut heap = self.heap.write().await;
        heap.insert(CacheEntry::new(key, value, expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.heap.write().await.remove(key);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.heap.write().await.clear();
        Ok(())
    }

    async fn gc(&self) -> Result<usize> {
        let now = self.clock.now();

        // The heap is ordered by expiry, so stop at the first live entry.
        // The lock is released between removals so readers and writers
        // interleave with a long sweep.
        let mut removed = 0;
        while self.pop_expired(now).await {
            removed += 1;
        }
        Ok(removed)
    }
}
