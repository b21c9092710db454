//! Expiry Heap Module
//!
//! Binary min-heap of cache entries ordered by expiration instant, paired with
//! a key index so entries can be found and removed by key.

use std::collections::HashMap;

use crate::cache::CacheEntry;

// == Expiry Heap ==
/// Entries ordered by `expires_at`, earliest at slot 0.
///
/// `index` maps every key to its current slot in `slots`. Both are updated
/// together on every swap, so after each public call:
/// - every key in `index` points at the slot holding that key, and
/// - every slot's key is in `index`.
///
/// Not synchronized. Callers hold the owning store's lock.
#[derive(Debug)]
pub struct ExpiryHeap<V> {
    slots: Vec<CacheEntry<V>>,
    index: HashMap<String, usize>,
}

impl<V> ExpiryHeap<V> {
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
        }
    }

    // == Insert ==
    /// Adds an entry, or replaces the value and expiry of the entry already
    /// stored under the same key.
    ///
    /// Replacement keeps the existing slot and re-sifts it, so a key never
    /// occupies more than one slot. Returns the replaced value, if any.
    pub fn insert(&mut self, entry: CacheEntry<V>) -> Option<V> {
        if let Some(&slot) = self.index.get(&entry.key) {
            let current = &mut self.slots[slot];
            let old = std::mem::replace(&mut current.value, entry.value);
            current.expires_at = entry.expires_at;
            self.fix(slot);
            return Some(old);
        }

        let slot = self.slots.len();
        self.index.insert(entry.key.clone(), slot);
        self.slots.push(entry);
        self.sift_up(slot);
        None
    }

    // == Remove At ==
    /// Removes the entry in `slot`, returning it.
    ///
    /// The last slot is swapped into the hole and sifted into place.
    pub fn remove_at(&mut self, slot: usize) -> Option<CacheEntry<V>> {
        if slot >= self.slots.len() {
            return None;
        }

        let last = self.slots.len() - 1;
        if slot != last {
            self.swap(slot, last);
        }

        let entry = self.slots.pop()?;
        self.index.remove(&entry.key);

        if slot < self.slots.len() {
            self.fix(slot);
        }
        Some(entry)
    }

    // == Remove ==
    /// Removes the entry stored under `key`. Absent keys are a no-op.
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let slot = *self.index.get(key)?;
        self.remove_at(slot)
    }

    // == Peek Min ==
    /// Returns the entry with the earliest expiration.
    pub fn peek_min(&self) -> Option<&CacheEntry<V>> {
        self.slots.first()
    }

    // == Pop Min ==
    /// Removes and returns the entry with the earliest expiration.
    pub fn pop_min(&mut self) -> Option<CacheEntry<V>> {
        self.remove_at(0)
    }

    // == Get ==
    pub fn get(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.index.get(key).map(|&slot| &self.slots[slot])
    }

    /// Current slot of `key`, if stored.
    #[cfg(test)]
    pub(crate) fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    #[cfg(test)]
    pub(crate) fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    // == Clear ==
    /// Drops every entry.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
    }

    // == Length ==
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    // == Ordering Helpers ==
    fn less(&self, i: usize, j: usize) -> bool {
        self.slots[i].expires_at < self.slots[j].expires_at
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.slots.swap(i, j);
        if let Some(slot) = self.index.get_mut(&self.slots[i].key) {
            *slot = i;
        }
        if let Some(slot) = self.index.get_mut(&self.slots[j].key) {
            *slot = j;
        }
    }

    /// Restores heap order around `slot` after its expiry changed.
    fn fix(&mut self, slot: usize) {
        if !self.sift_up(slot) {
            self.sift_down(slot);
        }
    }

    /// Returns true if the entry moved.
    fn sift_up(&mut self, mut slot: usize) -> bool {
        let start = slot;
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if !self.less(slot, parent) {
                break;
            }
            self.swap(slot, parent);
            slot = parent;
        }
        slot != start
    }

    fn sift_down(&mut self, mut slot: usize) {
        let len = self.slots.len();
        loop {
            let left = 2 * slot + 1;
            if left >= len {
                break;
            }

            let right = left + 1;
            let mut child = left;
            if right < len && self.less(right, left) {
                child = right;
            }

            if !self.less(child, slot) {
                break;
            }
            self.swap(slot, child);
            slot = child;
        }
    }

    /// Panics if the heap order or the key index is broken.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        assert_eq!(self.slots.len(), self.index.len(), "index size mismatch");
        for (slot, entry) in self.slots.iter().enumerate() {
            assert_eq!(
                self.index.get(&entry.key),
                Some(&slot),
                "index out of sync for {}",
                entry.key
            );
            if slot > 0 {
                let parent = (slot - 1) / 2;
                assert!(
                    self.slots[parent].expires_at <= entry.expires_at,
                    "heap order broken at slot {}",
                    slot
                );
            }
        }
    }
}

impl<V> Default for ExpiryHeap<V> {
    fn default() -> Self {
        Self::new()
    }
}
