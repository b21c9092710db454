//! Background Tasks Module
//!
//! Contains background tasks that run periodically alongside a cache store.
//!
//! # Tasks
//! - GC: Removes expired cache entries at configured intervals

mod gc;

pub use gc::{spawn_gc_task, ErrorFunc, GcHandle, GcOptions, DEFAULT_GC_INTERVAL, MIN_GC_INTERVAL};
