//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::DEFAULT_ROOT_DIR;
use crate::tasks::GcOptions;

/// Storage used behind the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// In-process TTL cache, lost on restart
    #[default]
    Memory,
    /// One file per entry under `Config::cache_dir`
    File,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Backend::Memory),
            "file" => Ok(Backend::File),
            other => Err(format!("unknown cache backend: {}", other)),
        }
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Storage backend
    pub backend: Backend,
    /// Root directory of the file backend
    pub cache_dir: PathBuf,
    /// Default lifetime in seconds for entries written without an explicit TTL
    pub default_ttl: u64,
    /// HTTP server port
    pub server_port: u16,
    /// GC task interval in seconds
    pub gc_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_BACKEND` - `memory` or `file` (default: memory)
    /// - `CACHE_DIR` - File backend root directory (default: cache)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `GC_INTERVAL` - GC frequency in seconds (default: 300)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend: parse_env("CACHE_BACKEND").unwrap_or(defaults.backend),
            cache_dir: env::var("CACHE_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            default_ttl: parse_env("DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            server_port: parse_env("SERVER_PORT").unwrap_or(defaults.server_port),
            gc_interval: parse_env("GC_INTERVAL").unwrap_or(defaults.gc_interval),
        }
    }

    /// Default lifetime for writes without a TTL.
    pub fn default_lifetime(&self) -> Duration {
        Duration::from_secs(self.default_ttl)
    }

    /// GC task options; intervals under a second fall back to the default.
    pub fn gc_options(&self) -> GcOptions {
        GcOptions::new(Duration::from_secs(self.gc_interval))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            cache_dir: PathBuf::from(DEFAULT_ROOT_DIR),
            default_ttl: 300,
            server_port: 3000,
            gc_interval: 300,
        }
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
