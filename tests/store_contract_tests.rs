//! Contract Tests for Cache Backends
//!
//! Runs the same scenarios against every backend through `dyn Cache`.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use ttl_cache::cache::{Cache, FileStore, ManualClock, MemoryStore};
use ttl_cache::{spawn_gc_task, CacheError, GcOptions};

type Backends = Vec<(&'static str, Arc<dyn Cache<String>>, Arc<ManualClock>)>;

// == Helper Functions ==

/// Memory and file backends, each with its own manual clock.
///
/// The returned directory must outlive the file backend.
fn backends() -> (Backends, TempDir) {
    let dir = tempfile::tempdir().unwrap();

    let memory_clock = Arc::new(ManualClock::default());
    let memory = Arc::new(MemoryStore::<String>::with_clock(memory_clock.clone()));

    let file_clock = Arc::new(ManualClock::default());
    let file = Arc::new(
        FileStore::<String>::new(dir.path().join("cache")).with_clock(file_clock.clone()),
    );

    (
        vec![
            ("memory", memory as Arc<dyn Cache<String>>, memory_clock),
            ("file", file as Arc<dyn Cache<String>>, file_clock),
        ],
        dir,
    )
}

// == Contract Tests ==

#[tokio::test]
async fn test_basic_operations() {
    let (backends, _dir) = backends();

    for (name, cache, _clock) in backends {
        cache
            .set("username", "flamego".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("username").await.unwrap(), "flamego", "{}", name);

        cache.delete("username").await.unwrap();
        assert!(
            matches!(cache.get("username").await, Err(CacheError::NotFound(_))),
            "{}",
            name
        );

        cache
            .set("random", "value".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        cache.flush().await.unwrap();
        assert!(cache.get("random").await.is_err(), "{}", name);
    }
}

#[tokio::test]
async fn test_delete_absent_twice() {
    let (backends, _dir) = backends();

    for (name, cache, _clock) in backends {
        assert!(cache.delete("never_set").await.is_ok(), "{}", name);
        assert!(cache.delete("never_set").await.is_ok(), "{}", name);
    }
}

#[tokio::test]
async fn test_gc_precision() {
    let (backends, _dir) = backends();

    for (name, cache, clock) in backends {
        for (key, secs) in [("1", 1), ("2", 2), ("3", 3)] {
            cache
                .set(key, key.to_string(), Duration::from_secs(secs))
                .await
                .unwrap();
        }

        clock.advance(Duration::from_secs(2));

        assert_eq!(cache.gc().await.unwrap(), 2, "{}", name);
        assert!(cache.get("1").await.is_err(), "{}", name);
        assert!(cache.get("2").await.is_err(), "{}", name);
        assert_eq!(cache.get("3").await.unwrap(), "3", "{}", name);
    }
}

#[tokio::test]
async fn test_flush_then_gc_reports_zero() {
    let (backends, _dir) = backends();

    for (name, cache, clock) in backends {
        cache
            .set("k", "v".to_string(), Duration::from_secs(1))
            .await
            .unwrap();
        cache.flush().await.unwrap();

        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.gc().await.unwrap(), 0, "{}", name);
    }
}

#[tokio::test]
async fn test_gc_task_over_every_backend() {
    let (backends, _dir) = backends();

    for (name, cache, clock) in backends {
        cache
            .set("short", "v".to_string(), Duration::from_secs(1))
            .await
            .unwrap();
        cache
            .set("long", "v".to_string(), Duration::from_secs(3600))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(2));

        // The first run happens as soon as the task starts
        let handle = spawn_gc_task(cache.clone(), GcOptions::new(Duration::from_secs(60)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;

        assert_eq!(cache.gc().await.unwrap(), 0, "{}", name);
        assert_eq!(cache.get("long").await.unwrap(), "v", "{}", name);
    }
}
