//! GC Task
//!
//! Background task that periodically asks a cache store to remove expired
//! entries.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::error::CacheError;

/// Interval used when none (or one under a second) is configured
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Shortest interval accepted as configured
pub const MIN_GC_INTERVAL: Duration = Duration::from_secs(1);

/// Receives errors from GC runs in the background.
pub type ErrorFunc = Arc<dyn Fn(CacheError) + Send + Sync>;

// == GC Options ==
/// Options for the GC task.
#[derive(Clone)]
pub struct GcOptions {
    /// Time between two GC runs
    pub interval: Duration,
    /// Called with every error returned by a GC run. Default drops errors
    pub on_error: ErrorFunc,
}

impl GcOptions {
    /// Creates options with the given interval and errors dropped.
    ///
    /// Intervals under one second fall back to `DEFAULT_GC_INTERVAL`.
    pub fn new(interval: Duration) -> Self {
        let interval = if interval < MIN_GC_INTERVAL {
            DEFAULT_GC_INTERVAL
        } else {
            interval
        };

        Self {
            interval,
            on_error: Arc::new(|_| {}),
        }
    }

    /// Sets the function receiving GC errors.
    pub fn with_error_func(
        mut self,
        on_error: impl Fn(CacheError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Arc::new(on_error);
        self
    }
}

impl Default for GcOptions {
    fn default() -> Self {
        Self::new(DEFAULT_GC_INTERVAL)
    }
}

impl fmt::Debug for GcOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcOptions")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

// == GC Handle ==
/// Handle to a running GC task.
///
/// Dropping the handle without calling [`GcHandle::stop`] leaves the task
/// running for the life of the runtime.
#[derive(Debug)]
pub struct GcHandle {
    stop: Arc<Notify>,
    task: JoinHandle<()>,
}

impl GcHandle {
    /// Signals the task to stop and waits for it to exit.
    ///
    /// A GC run already in progress is allowed to finish.
    pub async fn stop(self) {
        self.stop.notify_one();
        if let Err(e) = self.task.await {
            warn!("GC task ended abnormally: {}", e);
        }
    }

    #[cfg(test)]
    fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawns a background task that runs `cache.gc()` once immediately and then
/// once every `options.interval` until stopped.
///
/// Errors from a run are passed to `options.on_error` and never end the loop.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(MemoryStore::<String>::new());
/// let gc = spawn_gc_task(cache.clone(), GcOptions::new(Duration::from_secs(60)));
/// // Later, during shutdown:
/// gc.stop().await;
/// ```
pub fn spawn_gc_task<V, C>(cache: Arc<C>, options: GcOptions) -> GcHandle
where
    C: Cache<V> + ?Sized,
{
    let stop = Arc::new(Notify::new());
    let signal = Arc::clone(&stop);

    let task = tokio::spawn(async move {
        let GcOptions { interval, on_error } = options;
        info!("Starting GC task with interval of {:?}", interval);

        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            match cache.gc().await {
                Ok(0) => debug!("GC: no expired entries found"),
                Ok(removed) => info!("GC: removed {} expired entries", removed),
                Err(e) => {
                    warn!("GC failed: {}", e);
                    on_error(e);
                }
            }

            tokio::select! {
                _ = signal.notified() => break,
                _ = ticker.tick() => {}
            }
        }

        info!("GC task stopped");
    });

    GcHandle { stop, task }
}
