//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the expiry heap and the memory store against a
//! simple model.

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::cache::{Cache, CacheEntry, Clock, ExpiryHeap, ManualClock, MemoryStore};

// == Strategies ==
/// Generates keys from a small alphabet so operations collide often
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-e]{1,2}".prop_map(|s| s)
}

/// Lifetimes in whole seconds, including zero
fn lifetime_strategy() -> impl Strategy<Value = u64> {
    0u64..20
}

#[derive(Debug, Clone)]
enum HeapOp {
    Insert { key: String, secs: u64 },
    Remove { key: String },
    PopMin,
}

fn heap_op_strategy() -> impl Strategy<Value = HeapOp> {
    prop_oneof![
        3 => (key_strategy(), lifetime_strategy())
            .prop_map(|(key, secs)| HeapOp::Insert { key, secs }),
        1 => key_strategy().prop_map(|key| HeapOp::Remove { key }),
        1 => Just(HeapOp::PopMin),
    ]
}

#[derive(Debug, Clone)]
enum StoreOp {
    Set { key: String, value: u32, secs: u64 },
    Get { key: String },
    Delete { key: String },
    Advance { secs: u64 },
    Gc,
    Flush,
}

fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        4 => (key_strategy(), any::<u32>(), lifetime_strategy())
            .prop_map(|(key, value, secs)| StoreOp::Set { key, value, secs }),
        3 => key_strategy().prop_map(|key| StoreOp::Get { key }),
        1 => key_strategy().prop_map(|key| StoreOp::Delete { key }),
        2 => (0u64..5).prop_map(|secs| StoreOp::Advance { secs }),
        1 => Just(StoreOp::Gc),
        1 => Just(StoreOp::Flush),
    ]
}

fn at(base: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    base + TimeDelta::seconds(secs as i64)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // Heap order and key index stay consistent with a map model after every op
    #[test]
    fn prop_heap_matches_model(ops in prop::collection::vec(heap_op_strategy(), 1..80)) {
        let base = Utc::now();
        let mut heap = ExpiryHeap::new();
        let mut model: HashMap<String, DateTime<Utc>> = HashMap::new();

        for op in ops {
            match op {
                HeapOp::Insert { key, secs } => {
                    heap.insert(CacheEntry::new(key.clone(), secs, at(base, secs)));
                    model.insert(key, at(base, secs));
                }
                HeapOp::Remove { key } => {
                    let removed = heap.remove(&key).map(|e| e.key);
                    prop_assert_eq!(removed.is_some(), model.remove(&key).is_some());
                }
                HeapOp::PopMin => {
                    let earliest = model.values().min().copied();
                    let popped = heap.pop_min();
                    prop_assert_eq!(popped.as_ref().map(|e| e.expires_at), earliest);
                    if let Some(entry) = popped {
                        model.remove(&entry.key);
                    }
                }
            }

            heap.assert_invariants();
            prop_assert_eq!(heap.len(), model.len());
            for (key, expires_at) in &model {
                prop_assert_eq!(heap.get(key).map(|e| e.expires_at), Some(*expires_at));
            }
        }
    }

    // Draining the heap yields entries in non-decreasing expiry order
    #[test]
    fn prop_pop_min_is_sorted(
        entries in prop::collection::vec((key_strategy(), lifetime_strategy()), 0..60)
    ) {
        let base = Utc::now();
        let mut heap = ExpiryHeap::new();
        for (key, secs) in entries {
            heap.insert(CacheEntry::new(key, (), at(base, secs)));
        }

        let mut previous = None;
        while let Some(entry) = heap.pop_min() {
            if let Some(previous) = previous {
                prop_assert!(previous <= entry.expires_at);
            }
            previous = Some(entry.expires_at);
        }
    }

    // Reads, GC and flush agree with a model that tracks live entries only
    #[test]
    fn prop_store_matches_model(ops in prop::collection::vec(store_op_strategy(), 1..60)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let clock = Arc::new(ManualClock::default());
            let store: MemoryStore<u32> = MemoryStore::with_clock(clock.clone());
            let mut model: HashMap<String, (u32, DateTime<Utc>)> = HashMap::new();

            for op in ops {
                let now = clock.now();
                match op {
                    StoreOp::Set { key, value, secs } => {
                        store.set(&key, value, Duration::from_secs(secs)).await.unwrap();
                        model.insert(key, (value, at(now, secs)));
                    }
                    StoreOp::Get { key } => {
                        let expected = model
                            .get(&key)
                            .filter(|(_, expires_at)| *expires_at > now)
                            .map(|(value, _)| *value);
                        let actual = store.get(&key).await.ok();
                        prop_assert_eq!(actual, expected);
                    }
                    StoreOp::Delete { key } => {
                        store.delete(&key).await.unwrap();
                        model.remove(&key);
                    }
                    StoreOp::Advance { secs } => {
                        clock.advance(Duration::from_secs(secs));
                    }
                    StoreOp::Gc => {
                        let before = store.len().await;
                        let removed = store.gc().await.unwrap();
                        model.retain(|_, (_, expires_at)| *expires_at > now);

                        prop_assert!(removed <= before);
                        prop_assert_eq!(store.len().await, model.len());
                    }
                    StoreOp::Flush => {
                        store.flush().await.unwrap();
                        model.clear();
                    }
                }

                store.assert_invariants().await;
            }
            Ok(())
        })?;
    }
}
