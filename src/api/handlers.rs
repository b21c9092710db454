//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;

use crate::cache::{Cache, FileStore, MemoryStore};
use crate::config::{Backend, Config};
use crate::error::{CacheError, Result};
use crate::models::{
    DeleteResponse, FlushResponse, GcResponse, GetResponse, HealthResponse, SetRequest,
    SetResponse,
};

/// Application state shared across all handlers.
///
/// Holds the cache behind the `Cache` trait so any backend can serve requests.
#[derive(Clone)]
pub struct AppState {
    /// Thread-safe cache store
    pub cache: Arc<dyn Cache<Value>>,
    /// Lifetime applied when a write carries no TTL
    pub default_ttl: Duration,
}

impl AppState {
    /// Creates a new AppState with the given cache store.
    pub fn new(cache: Arc<dyn Cache<Value>>, default_ttl: Duration) -> Self {
        Self { cache, default_ttl }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Initializes the configured backend.
    pub fn from_config(config: &Config) -> Self {
        let cache: Arc<dyn Cache<Value>> = match config.backend {
            Backend::Memory => Arc::new(MemoryStore::<Value>::new()),
            Backend::File => Arc::new(FileStore::<Value>::new(config.cache_dir.clone())),
        };
        Self::new(cache, config.default_lifetime())
    }
}

/// Handler for PUT /set
///
/// Stores a key-value pair in the cache with optional TTL.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    // Validate request
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let lifetime = req.ttl.map(Duration::from_secs).unwrap_or(state.default_ttl);
    state.cache.set(&req.key, req.value, lifetime).await?;

    Ok(Json(SetResponse::new(req.key, lifetime.as_secs())))
}

/// Handler for GET /get/:key
///
/// Retrieves a value from the cache by key.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let value = state.cache.get(&key).await?;

    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for DELETE /del/:key
///
/// Deletes a key from the cache. Deleting a missing key succeeds.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    state.cache.delete(&key).await?;

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for POST /flush
pub async fn flush_handler(State(state): State<AppState>) -> Result<Json<FlushResponse>> {
    state.cache.flush().await?;

    Ok(Json(FlushResponse::new()))
}

/// Handler for POST /gc
///
/// Runs a GC pass on demand.
pub async fn gc_handler(State(state): State<AppState>) -> Result<Json<GcResponse>> {
    let removed = state.cache.gc().await?;

    Ok(Json(GcResponse { removed }))
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
