//! TTL Cache - A key/value cache with pluggable backends
//!
//! Provides an in-process cache with per-key expiration, a file-backed store
//! sharing the same contract, and a background GC task.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{Cache, FileStore, MemoryStore};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::{spawn_gc_task, GcHandle, GcOptions};
